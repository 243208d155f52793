//! Retry policy
//! Re-issues a failed resource load once, after the proxy is activated

use std::sync::Arc;

use crate::error::LoadError;
use crate::page::resource::{LoadedResource, RestrictedResource};
use crate::proxy::handshake::wait_activated;
use crate::proxy::lifecycle::ProxyContainer;

pub const DEFAULT_RETRY_MARKER: &str = "#retry";

pub struct RetryPolicy {
    container: Arc<ProxyContainer>,
    marker: String,
}

impl RetryPolicy {
    pub fn new(container: Arc<ProxyContainer>, marker: impl Into<String>) -> Self {
        Self {
            container,
            marker: marker.into(),
        }
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Re-issue the load with the marker appended, at most once per resource.
    ///
    /// Returns `None` when no re-fetch was triggered.
    pub async fn retry(&self, resource: &RestrictedResource) -> Option<Result<LoadedResource, LoadError>> {
        if !resource.begin_retry() {
            tracing::debug!("Retry of {} already in progress", resource.src());
            return None;
        }
        let outcome = self.retry_claimed(resource).await;
        resource.end_retry();
        outcome
    }

    async fn retry_claimed(&self, resource: &RestrictedResource) -> Option<Result<LoadedResource, LoadError>> {
        let src = resource.src();
        if src.contains(&self.marker) {
            tracing::debug!("{} was already retried", src);
            return None;
        }

        tracing::info!("Retrying {}...", src);
        if let Err(e) = wait_activated(&self.container).await {
            tracing::warn!("Not retrying {}: {}", src, e);
            return None;
        }

        resource.set_src(format!("{}{}", src, self.marker));
        Some(resource.load().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::Page;
    use crate::proxy::lifecycle::RegistrationOptions;
    use crate::proxy::upstream::testing::RecordingTransport;
    use serde_json::json;

    struct Fixture {
        container: Arc<ProxyContainer>,
        network: Arc<RecordingTransport>,
        upstream: Arc<RecordingTransport>,
        page: Arc<Page>,
    }

    fn fixture() -> Fixture {
        let container = Arc::new(ProxyContainer::new());
        let network = Arc::new(RecordingTransport::failing());
        let upstream = Arc::new(RecordingTransport::default());
        let page = Arc::new(Page::new(Arc::clone(&container), network.clone()));
        Fixture {
            container,
            network,
            upstream,
            page,
        }
    }

    #[tokio::test]
    async fn test_marked_url_is_never_retried() {
        let f = fixture();
        let policy = RetryPolicy::new(Arc::clone(&f.container), DEFAULT_RETRY_MARKER);
        let resource = RestrictedResource::new(Arc::clone(&f.page), "http://host/restricted/x#retry");

        assert!(policy.retry(&resource).await.is_none());
        assert!(policy.retry(&resource).await.is_none());
        assert!(f.network.sent().is_empty());
        assert!(f.upstream.sent().is_empty());
    }

    #[tokio::test]
    async fn test_failed_load_is_retried_once_through_proxy() {
        let f = fixture();
        let policy = RetryPolicy::new(Arc::clone(&f.container), DEFAULT_RETRY_MARKER);
        let resource = RestrictedResource::new(Arc::clone(&f.page), "http://host/restricted/x");

        // Nothing controls the page yet, so the first attempt hits the failing network.
        let retry = {
            let container = Arc::clone(&f.container);
            let upstream = f.upstream.clone();
            async move {
                let registration = container.register(RegistrationOptions::new(upstream)).unwrap();
                registration
                    .handle()
                    .post_message(json!({"action": "sync-token", "token": "tok123"}))
                    .await
                    .unwrap();
            }
        };
        let (loaded, _) = tokio::join!(resource.load_with_retry(&policy), retry);

        let loaded = loaded.unwrap();
        assert_eq!(loaded.src, "http://host/restricted/x#retry");
        assert_eq!(f.network.sent().len(), 1);
        let forwarded = f.upstream.sent();
        assert_eq!(forwarded.len(), 1);
        assert!(forwarded[0].has_authorization());

        // A second failure does not trigger another attempt.
        assert!(policy.retry(&resource).await.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_retries_trigger_one_fetch() {
        let f = fixture();
        let policy = RetryPolicy::new(Arc::clone(&f.container), DEFAULT_RETRY_MARKER);
        let resource = RestrictedResource::new(Arc::clone(&f.page), "http://host/restricted/x");

        let registration = f
            .container
            .register(RegistrationOptions::new(f.upstream.clone()))
            .unwrap();
        registration
            .handle()
            .post_message(json!({"action": "sync-token", "token": "tok123"}))
            .await
            .unwrap();

        let (first, second) = tokio::join!(policy.retry(&resource), policy.retry(&resource));
        assert_eq!(
            first.is_some() as usize + second.is_some() as usize,
            1
        );
        assert_eq!(f.upstream.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_resources_sharing_a_url_retry_independently() {
        let f = fixture();
        let policy = RetryPolicy::new(Arc::clone(&f.container), DEFAULT_RETRY_MARKER);
        let first = RestrictedResource::new(Arc::clone(&f.page), "http://host/restricted/x");
        let second = RestrictedResource::new(Arc::clone(&f.page), "http://host/restricted/x");

        let registration = f
            .container
            .register(RegistrationOptions::new(f.upstream.clone()))
            .unwrap();
        registration
            .handle()
            .post_message(json!({"action": "sync-token", "token": "tok123"}))
            .await
            .unwrap();

        assert!(policy.retry(&first).await.is_some());
        assert!(policy.retry(&second).await.is_some());
        assert_eq!(second.src(), "http://host/restricted/x#retry");
        assert_eq!(f.upstream.sent().len(), 2);

        // Each resource still gets only one attempt.
        assert!(policy.retry(&first).await.is_none());
        assert!(policy.retry(&second).await.is_none());
    }
}
