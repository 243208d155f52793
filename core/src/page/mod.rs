//! Foreground page context
//! Owns the credential and loads resources through the controlling proxy

pub mod resource;
pub mod retry;
pub mod sync;

use std::sync::Arc;

use crate::error::InterceptError;
use crate::proxy::lifecycle::ProxyContainer;
use crate::proxy::upstream::{OutboundRequest, Transport, UpstreamResponse};

pub use resource::{LoadedResource, RestrictedResource};
pub use retry::RetryPolicy;
pub use sync::CredentialSync;

/// The page's network path
pub struct Page {
    container: Arc<ProxyContainer>,
    network: Arc<dyn Transport>,
}

impl Page {
    pub fn new(container: Arc<ProxyContainer>, network: Arc<dyn Transport>) -> Self {
        Self { container, network }
    }

    pub fn container(&self) -> &Arc<ProxyContainer> {
        &self.container
    }

    /// Route through the controlling proxy when there is one, otherwise
    /// straight to the network.
    pub async fn fetch(&self, request: OutboundRequest) -> Result<UpstreamResponse, InterceptError> {
        match self.container.controller() {
            Some(controller) => controller.fetch(request).await,
            None => {
                tracing::debug!("No controlling proxy, fetching {} directly", request.url);
                Ok(self.network.send(request).await?)
            }
        }
    }
}
