//! bearer-relay core library
//! Credential broker, background interception proxy and the foreground page context

pub mod broker;
pub mod config;
pub mod error;
pub mod origin;
pub mod page;
pub mod proxy;
