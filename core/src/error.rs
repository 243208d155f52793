//! Error types
//! Shared by the foreground page and the background proxy

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

/// Failure to obtain a value from a [`crate::broker::TokenBroker`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BrokerError {
    #[error("credential not available within {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("credential broker dropped before delivering a value")]
    Closed,
}

/// The background proxy could not be installed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("invalid scope {0:?}: must be an absolute path")]
    InvalidScope(String),

    #[error("protected path prefix must not be empty")]
    EmptyProtectedPrefix,
}

/// Activation of the background proxy was never observed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("proxy registration failed: {0}")]
    Registration(#[from] RegistrationError),

    #[error("proxy stopped before reaching the activated state")]
    ProxyStopped,
}

/// Transport-level failure, passed through to the caller.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("invalid request url {0:?}")]
    InvalidUrl(String),

    #[error("request failed: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// The background proxy's event loop is gone.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("background proxy is no longer running")]
pub struct ProxyUnavailable;

/// Everything a single intercepted request can fail with.
#[derive(Debug, Clone, Error)]
pub enum InterceptError {
    #[error(transparent)]
    Credential(#[from] BrokerError),

    #[error("credential cannot be encoded as a header value")]
    InvalidCredential,

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    ProxyUnavailable(#[from] ProxyUnavailable),
}

/// Failure of the foreground-to-proxy credential push.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    #[error("foreground credential unavailable: {0}")]
    Credential(#[from] BrokerError),

    #[error(transparent)]
    ProxyUnavailable(#[from] ProxyUnavailable),
}

/// A restricted resource failed to load.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    #[error(transparent)]
    Intercept(#[from] InterceptError),

    #[error("resource responded with {0}")]
    Status(StatusCode),
}
