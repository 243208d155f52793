//! Background interception proxy
//! Lifecycle, handshake, request interception and the HTTP ingress

pub mod handshake;
pub mod interceptor;
pub mod lifecycle;
pub mod message;
pub mod server;
pub mod upstream;
mod worker;

pub use handshake::{wait_activated, wait_registered};
pub use interceptor::{InterceptionDecision, InterceptionRules, RequestInterceptor};
pub use lifecycle::{ActivationState, ProxyContainer, ProxyHandle, Registration, RegistrationOptions};
pub use message::ProxyMessage;
pub use server::ProxyServer;
pub use upstream::{HttpTransport, OutboundRequest, RequestMode, Transport, UpstreamResponse};
