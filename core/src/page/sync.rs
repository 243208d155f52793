//! Credential sync
//! Pushes the foreground credential into the proxy's broker after the handshake

use std::sync::Arc;

use crate::broker::TokenBroker;
use crate::error::{RegistrationError, SyncError};
use crate::proxy::handshake::wait_registered;
use crate::proxy::lifecycle::{ProxyContainer, ProxyHandle, Registration};
use crate::proxy::message::ProxyMessage;

pub struct CredentialSync {
    container: Arc<ProxyContainer>,
    /// The foreground's own broker; the proxy holds a separate one.
    credentials: Arc<TokenBroker>,
}

impl CredentialSync {
    pub fn new(container: Arc<ProxyContainer>, credentials: Arc<TokenBroker>) -> Self {
        Self {
            container,
            credentials,
        }
    }

    /// Wait for activation, then send the credential once. Failures are
    /// logged and returned; nothing is retried.
    pub async fn run(
        &self,
        registration: Result<Registration, RegistrationError>,
    ) -> Result<ProxyHandle, SyncError> {
        let result = self.sync_once(registration).await;
        if let Err(e) = &result {
            tracing::error!("Credential sync failed: {}", e);
        }
        result
    }

    async fn sync_once(
        &self,
        registration: Result<Registration, RegistrationError>,
    ) -> Result<ProxyHandle, SyncError> {
        let controller = wait_registered(&self.container, registration).await?;
        tracing::info!("Proxy {} is activated", controller.id());

        let token = self.credentials.wait(None).await?;
        controller
            .post_message(ProxyMessage::SyncToken { token }.into_value())
            .await?;
        tracing::info!("Credential synced to proxy {}", controller.id());

        Ok(controller)
    }
}
