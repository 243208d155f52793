//! Restricted resource
//! A protected URL loaded through the page's network path

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use reqwest::header;

use crate::error::LoadError;
use crate::page::retry::RetryPolicy;
use crate::page::Page;
use crate::proxy::upstream::{OutboundRequest, RequestMode};

/// Loaded bytes, ready to hand to whatever renders them
#[derive(Debug, Clone)]
pub struct LoadedResource {
    pub src: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

pub struct RestrictedResource {
    page: Arc<Page>,
    src: Mutex<String>,
    retrying: AtomicBool,
}

impl RestrictedResource {
    pub fn new(page: Arc<Page>, src: impl Into<String>) -> Self {
        Self {
            page,
            src: Mutex::new(src.into()),
            retrying: AtomicBool::new(false),
        }
    }

    pub fn page(&self) -> &Arc<Page> {
        &self.page
    }

    pub fn src(&self) -> String {
        self.src.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub(crate) fn set_src(&self, src: String) {
        *self.src.lock().unwrap_or_else(PoisonError::into_inner) = src;
    }

    /// Claim the in-flight retry slot. False when a retry is already running.
    pub(crate) fn begin_retry(&self) -> bool {
        self.retrying
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn end_retry(&self) {
        self.retrying.store(false, Ordering::Release);
    }

    /// One load attempt, issued like an image tag would issue it.
    pub async fn load(&self) -> Result<LoadedResource, LoadError> {
        let src = self.src();
        let request = OutboundRequest::get(src.clone()).with_mode(RequestMode::NoCors);
        let response = self.page.fetch(request).await?;

        if !response.status.is_success() {
            return Err(LoadError::Status(response.status));
        }

        let content_type = response
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        Ok(LoadedResource {
            src,
            content_type,
            bytes: response.body,
        })
    }

    /// Load, and on failure let `policy` re-issue it once.
    pub async fn load_with_retry(&self, policy: &RetryPolicy) -> Result<LoadedResource, LoadError> {
        match self.load().await {
            Ok(loaded) => Ok(loaded),
            Err(e) => {
                tracing::warn!("Failed to load {}: {}", self.src(), e);
                match policy.retry(self).await {
                    Some(retried) => retried,
                    None => Err(e),
                }
            }
        }
    }
}
