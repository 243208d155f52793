//! Activation handshake
//!
//! Resolves once the container's controller has reached
//! [`ActivationState::Activated`], whether it was already active (warm
//! start), is still installing, or has not been attached yet (cold start).
//! `watch::Receiver::wait_for` inspects the current value before waiting,
//! so an activation that lands between reading the controller and
//! subscribing to its state is never missed. The controller channel can
//! not close while the container is borrowed, so only a stopped proxy
//! fails the wait.

use crate::error::{HandshakeError, RegistrationError};
use crate::proxy::lifecycle::{ProxyContainer, ProxyHandle, Registration};

/// Wait until the container is controlled by an activated proxy.
pub async fn wait_activated(container: &ProxyContainer) -> Result<ProxyHandle, HandshakeError> {
    let mut controllers = container.subscribe();

    loop {
        let current = controllers.borrow_and_update().clone();
        let Some(handle) = current else {
            // The container owns the sender and outlives this borrow.
            let _ = controllers.changed().await;
            continue;
        };

        let mut states = handle.subscribe_state();
        tokio::select! {
            activated = async { states.wait_for(|s| s.is_activated()).await.map(|_| ()) } => {
                activated.map_err(|_| HandshakeError::ProxyStopped)?;
                return Ok(handle);
            }
            _ = controllers.changed() => {
                tracing::debug!("Controller replaced while waiting for activation");
            }
        }
    }
}

/// Turn a registration outcome into an activated controller.
pub async fn wait_registered(
    container: &ProxyContainer,
    registration: Result<Registration, RegistrationError>,
) -> Result<ProxyHandle, HandshakeError> {
    let registration = registration?;
    tracing::debug!("Waiting for proxy {} to activate", registration.handle().id());
    wait_activated(container).await
}
