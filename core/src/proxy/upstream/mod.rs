//! Outbound requests and the transport that carries them

pub mod client;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{self, HeaderMap, HeaderName};
use reqwest::{Method, StatusCode};

use crate::error::FetchError;

pub use client::HttpTransport;

/// Request mode, mirroring how a page issues the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    /// Opaque load (e.g. an image tag): only safelisted headers travel.
    NoCors,
    /// Cross-origin load that may carry arbitrary headers.
    Cors,
    #[default]
    SameOrigin,
}

impl RequestMode {
    /// Whether a header may be sent in this mode
    pub fn allows_header(self, name: &HeaderName) -> bool {
        match self {
            Self::Cors | Self::SameOrigin => true,
            Self::NoCors => {
                *name == header::ACCEPT
                    || *name == header::ACCEPT_LANGUAGE
                    || *name == header::CONTENT_LANGUAGE
                    || *name == header::CONTENT_TYPE
            }
        }
    }
}

/// A request on its way out of the page
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    /// Full URL, fragment included. The fragment never leaves the process.
    pub url: String,
    pub headers: HeaderMap,
    pub mode: RequestMode,
    pub body: Bytes,
}

impl OutboundRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            mode: RequestMode::default(),
            body: Bytes::new(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn has_authorization(&self) -> bool {
        self.headers.contains_key(header::AUTHORIZATION)
    }
}

/// A fully buffered upstream response
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// The ordinary network stack requests are handed to.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: OutboundRequest) -> Result<UpstreamResponse, FetchError>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Records every request and answers 200 with an empty body.
    #[derive(Default)]
    pub(crate) struct RecordingTransport {
        sent: Mutex<Vec<OutboundRequest>>,
        failing: bool,
    }

    impl RecordingTransport {
        pub(crate) fn failing() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                failing: true,
            }
        }

        pub(crate) fn sent(&self) -> Vec<OutboundRequest> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send(&self, request: OutboundRequest) -> Result<UpstreamResponse, FetchError> {
            self.sent.lock().unwrap().push(request);
            if self.failing {
                return Err(FetchError::Transport("connection refused".to_string()));
            }
            Ok(UpstreamResponse {
                status: StatusCode::OK,
                headers: HeaderMap::new(),
                body: Bytes::new(),
            })
        }
    }
}
