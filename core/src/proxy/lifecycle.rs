//! Proxy lifecycle
//!
//! [`ProxyContainer`] is the foreground's view of background proxies: it
//! registers them and exposes the current controller. A [`ProxyHandle`] is
//! the only way to reach a running proxy, and it does so purely by message
//! passing.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use uuid::Uuid;

use crate::error::{InterceptError, ProxyUnavailable, RegistrationError};
use crate::proxy::interceptor::{InterceptionRules, DEFAULT_CREDENTIAL_TIMEOUT};
use crate::proxy::upstream::{OutboundRequest, Transport, UpstreamResponse};
use crate::proxy::worker::BackgroundProxy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationState {
    Unregistered,
    Installing,
    /// Installed, waiting to activate
    Installed,
    Activated,
}

impl ActivationState {
    pub fn is_activated(&self) -> bool {
        *self == Self::Activated
    }
}

/// Events delivered to a background proxy
pub enum ProxyEvent {
    Message(Value),
    Fetch(FetchEvent),
}

pub struct FetchEvent {
    pub request: OutboundRequest,
    pub respond_to: oneshot::Sender<Result<UpstreamResponse, InterceptError>>,
}

/// Cloneable reference to a running background proxy
#[derive(Clone)]
pub struct ProxyHandle {
    id: Uuid,
    scope: Arc<str>,
    state: watch::Receiver<ActivationState>,
    events: mpsc::Sender<ProxyEvent>,
}

impl ProxyHandle {
    pub(crate) fn new(
        scope: &str,
        state: watch::Receiver<ActivationState>,
        events: mpsc::Sender<ProxyEvent>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            scope: Arc::from(scope),
            state,
            events,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn state(&self) -> ActivationState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ActivationState> {
        self.state.clone()
    }

    /// Post a message to the proxy. Delivery is asynchronous.
    pub async fn post_message(&self, data: Value) -> Result<(), ProxyUnavailable> {
        self.events
            .send(ProxyEvent::Message(data))
            .await
            .map_err(|_| ProxyUnavailable)
    }

    /// Dispatch a request to the proxy as a fetch event and wait for its answer.
    pub async fn fetch(&self, request: OutboundRequest) -> Result<UpstreamResponse, InterceptError> {
        let (respond_to, response) = oneshot::channel();
        self.events
            .send(ProxyEvent::Fetch(FetchEvent { request, respond_to }))
            .await
            .map_err(|_| ProxyUnavailable)?;
        response.await.map_err(|_| ProxyUnavailable)?
    }
}

impl fmt::Debug for ProxyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyHandle")
            .field("id", &self.id)
            .field("scope", &self.scope)
            .field("state", &self.state())
            .finish()
    }
}

/// Everything needed to start a background proxy
#[derive(Clone)]
pub struct RegistrationOptions {
    pub scope: String,
    pub rules: InterceptionRules,
    pub credential_timeout: Duration,
    pub transport: Arc<dyn Transport>,
}

impl RegistrationOptions {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            scope: "/".to_string(),
            rules: InterceptionRules::default(),
            credential_timeout: DEFAULT_CREDENTIAL_TIMEOUT,
            transport,
        }
    }

    fn validate(&self) -> Result<(), RegistrationError> {
        if !self.scope.starts_with('/') {
            return Err(RegistrationError::InvalidScope(self.scope.clone()));
        }
        if self.rules.protected_prefix.is_empty() {
            return Err(RegistrationError::EmptyProtectedPrefix);
        }
        Ok(())
    }
}

/// A successful registration
#[derive(Debug, Clone)]
pub struct Registration {
    handle: ProxyHandle,
}

impl Registration {
    /// Handle to the registered proxy, usable before it is activated.
    pub fn handle(&self) -> &ProxyHandle {
        &self.handle
    }

    pub fn scope(&self) -> &str {
        self.handle.scope()
    }

    pub fn state(&self) -> ActivationState {
        self.handle.state()
    }
}

type Controller = watch::Sender<Option<ProxyHandle>>;

/// Lets an activated proxy take control of the container's page.
pub(crate) struct Clients {
    controller: Weak<Controller>,
}

impl Clients {
    pub(crate) fn claim(&self, handle: ProxyHandle) {
        match self.controller.upgrade() {
            Some(controller) => {
                tracing::info!("Proxy {} claimed scope {}", handle.id(), handle.scope());
                controller.send_replace(Some(handle));
            }
            None => tracing::debug!("Container gone, proxy {} has no clients", handle.id()),
        }
    }
}

/// Foreground registry of background proxies
pub struct ProxyContainer {
    controller: Arc<Controller>,
}

impl ProxyContainer {
    pub fn new() -> Self {
        let (controller, _) = watch::channel(None);
        Self {
            controller: Arc::new(controller),
        }
    }

    /// Register and start a background proxy for `options.scope`.
    pub fn register(&self, options: RegistrationOptions) -> Result<Registration, RegistrationError> {
        options.validate().map_err(|e| {
            tracing::error!("Proxy registration failed with {}", e);
            e
        })?;

        let clients = Clients {
            controller: Arc::downgrade(&self.controller),
        };
        let handle = BackgroundProxy::spawn(options, clients);
        tracing::info!("Registered proxy {} for scope {}", handle.id(), handle.scope());
        Ok(Registration { handle })
    }

    /// The proxy currently controlling this container, if any
    pub fn controller(&self) -> Option<ProxyHandle> {
        self.controller.borrow().clone()
    }

    pub fn activation_state(&self) -> ActivationState {
        self.controller()
            .map(|handle| handle.state())
            .unwrap_or(ActivationState::Unregistered)
    }

    /// Observe controller changes
    pub fn subscribe(&self) -> watch::Receiver<Option<ProxyHandle>> {
        self.controller.subscribe()
    }

    #[cfg(test)]
    pub(crate) fn clients(&self) -> Clients {
        Clients {
            controller: Arc::downgrade(&self.controller),
        }
    }
}

impl Default for ProxyContainer {
    fn default() -> Self {
        Self::new()
    }
}
