//! Background proxy actor
//! Owns the credential broker and answers fetch events

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, watch};

use crate::broker::TokenBroker;
use crate::proxy::interceptor::RequestInterceptor;
use crate::proxy::lifecycle::{
    ActivationState, Clients, FetchEvent, ProxyEvent, ProxyHandle, RegistrationOptions,
};
use crate::proxy::message::ProxyMessage;

const EVENT_QUEUE_DEPTH: usize = 256;

pub(crate) struct BackgroundProxy {
    handle_id: uuid::Uuid,
    broker: Arc<TokenBroker>,
    interceptor: Arc<RequestInterceptor>,
    state: watch::Sender<ActivationState>,
    events: mpsc::Receiver<ProxyEvent>,
    clients: Clients,
    /// Handed to the container on activation, then no longer held here
    unclaimed: Option<ProxyHandle>,
}

impl BackgroundProxy {
    /// Start the proxy task. It runs until every handle to it is dropped.
    pub(crate) fn spawn(options: RegistrationOptions, clients: Clients) -> ProxyHandle {
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        let (state_tx, state_rx) = watch::channel(ActivationState::Installing);
        let handle = ProxyHandle::new(&options.scope, state_rx, event_tx);

        // One broker per proxy lifetime.
        let broker = Arc::new(TokenBroker::new());
        let interceptor = Arc::new(RequestInterceptor::new(
            options.rules,
            Arc::clone(&broker),
            options.transport,
            options.credential_timeout,
        ));

        let proxy = Self {
            handle_id: handle.id(),
            broker,
            interceptor,
            state: state_tx,
            events: event_rx,
            clients,
            unclaimed: Some(handle.clone()),
        };
        tokio::spawn(proxy.run());

        handle
    }

    async fn run(mut self) {
        self.install();
        self.activate();

        while let Some(event) = self.events.recv().await {
            match event {
                ProxyEvent::Message(data) => self.on_message(&data),
                ProxyEvent::Fetch(event) => self.on_fetch(event),
            }
        }

        tracing::info!("Proxy {} stopped", self.handle_id);
    }

    fn install(&self) {
        self.state.send_replace(ActivationState::Installed);
        tracing::debug!("Proxy {} installed, skipping wait", self.handle_id);
    }

    fn activate(&mut self) {
        self.state.send_replace(ActivationState::Activated);
        tracing::info!("Proxy {} activated", self.handle_id);
        if let Some(handle) = self.unclaimed.take() {
            self.clients.claim(handle);
        }
    }

    fn on_message(&self, data: &Value) {
        if let Some(ProxyMessage::SyncToken { token }) = ProxyMessage::parse(data) {
            tracing::info!("Proxy {} received credential", self.handle_id);
            self.broker.set(token);
        }
    }

    fn on_fetch(&self, event: FetchEvent) {
        let interceptor = Arc::clone(&self.interceptor);
        tokio::spawn(async move {
            let result = interceptor.handle(event.request).await;
            if event.respond_to.send(result).is_err() {
                tracing::debug!("Fetch requester went away before the response");
            }
        });
    }
}
