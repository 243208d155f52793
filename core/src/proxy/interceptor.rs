//! Request interception
//! Decides which requests get the credential and rewrites them

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{self, HeaderValue};
use reqwest::Method;

use crate::broker::{Credential, TokenBroker};
use crate::error::InterceptError;
use crate::proxy::upstream::{OutboundRequest, RequestMode, Transport, UpstreamResponse};

pub const DEFAULT_PROTECTED_PREFIX: &str = "/restricted/";
pub const DEFAULT_OPT_OUT_MARKER: &str = "#skip-service-worker";
pub const DEFAULT_CREDENTIAL_TIMEOUT: Duration = Duration::from_millis(3000);

/// URL rules for eligibility
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptionRules {
    pub protected_prefix: String,
    pub opt_out_marker: String,
}

impl Default for InterceptionRules {
    fn default() -> Self {
        Self {
            protected_prefix: DEFAULT_PROTECTED_PREFIX.to_string(),
            opt_out_marker: DEFAULT_OPT_OUT_MARKER.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassReason {
    UnsafeMethod,
    AlreadyAuthorized,
    Unprotected,
    OptedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptionDecision {
    Inject,
    PassThrough(PassReason),
}

impl InterceptionRules {
    pub fn decide(&self, request: &OutboundRequest) -> InterceptionDecision {
        use InterceptionDecision::PassThrough;

        if request.method != Method::GET {
            return PassThrough(PassReason::UnsafeMethod);
        }
        if request.has_authorization() {
            return PassThrough(PassReason::AlreadyAuthorized);
        }
        if !request.url.contains(&self.protected_prefix) {
            return PassThrough(PassReason::Unprotected);
        }
        if !self.opt_out_marker.is_empty() && request.url.contains(&self.opt_out_marker) {
            return PassThrough(PassReason::OptedOut);
        }
        InterceptionDecision::Inject
    }
}

/// Rewrites eligible requests with the broker's credential and forwards them.
pub struct RequestInterceptor {
    rules: InterceptionRules,
    broker: Arc<TokenBroker>,
    transport: Arc<dyn Transport>,
    credential_timeout: Duration,
}

impl RequestInterceptor {
    pub fn new(
        rules: InterceptionRules,
        broker: Arc<TokenBroker>,
        transport: Arc<dyn Transport>,
        credential_timeout: Duration,
    ) -> Self {
        Self {
            rules,
            broker,
            transport,
            credential_timeout,
        }
    }

    pub fn rules(&self) -> &InterceptionRules {
        &self.rules
    }

    /// Handle one request. Exactly one request reaches the transport, or none
    /// if the credential is unavailable.
    pub async fn handle(&self, request: OutboundRequest) -> Result<UpstreamResponse, InterceptError> {
        if let InterceptionDecision::PassThrough(reason) = self.rules.decide(&request) {
            tracing::debug!("Passing {} {} through ({:?})", request.method, request.url, reason);
            return Ok(self.transport.send(request).await?);
        }

        let credential = self
            .broker
            .wait(Some(self.credential_timeout))
            .await
            .map_err(|e| {
                tracing::warn!("No credential for {}: {}", request.url, e);
                e
            })?;

        let authorized = authorize(request, &credential)?;
        tracing::debug!("Forwarding {} with injected credential", authorized.url);
        Ok(self.transport.send(authorized).await?)
    }
}

/// Clone of `request` carrying the bearer credential, in a mode that lets
/// the header cross origins.
fn authorize(mut request: OutboundRequest, credential: &Credential) -> Result<OutboundRequest, InterceptError> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", credential.expose()))
        .map_err(|_| InterceptError::InvalidCredential)?;
    value.set_sensitive(true);

    request.headers.insert(header::AUTHORIZATION, value);
    request.mode = RequestMode::Cors;
    Ok(request)
}
