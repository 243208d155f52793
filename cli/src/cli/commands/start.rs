use std::path::PathBuf;
use std::sync::Arc;

use bearer_relay_core::broker::TokenBroker;
use bearer_relay_core::config::{load_config, Config};
use bearer_relay_core::page::{CredentialSync, Page};
use bearer_relay_core::proxy::{HttpTransport, ProxyContainer, ProxyServer, RegistrationOptions, Transport};

pub async fn run(config_path: Option<PathBuf>, port_override: Option<u16>) -> anyhow::Result<()> {
    // Load configuration
    let mut config = load_config(config_path)?;

    // Apply port override if provided
    if let Some(port) = port_override {
        config.server.port = port;
    }

    tracing::info!("Starting bearer-relay...");
    tracing::info!("  Port: {}", config.server.port);
    tracing::info!("  Host: {}", config.server.bind_address());
    tracing::info!("  Upstream: {}", config.server.upstream);
    tracing::info!("  Protected prefix: {}", config.interception.protected_prefix);

    let page = bring_up(&config).await?;

    let server = ProxyServer::new(
        config.server.bind_address().to_string(),
        config.server.port,
        page,
        &config.server.upstream,
    );

    tracing::info!("Proxy server starting on http://{}:{}", config.server.bind_address(), config.server.port);
    tracing::info!("Press Ctrl+C to stop");

    // Run server (blocks until shutdown)
    server.run().await?;

    Ok(())
}

/// Register the background proxy and sync the foreground credential into it.
pub(crate) async fn bring_up(config: &Config) -> anyhow::Result<Arc<Page>> {
    let credential = config.credential.resolve().ok_or_else(|| {
        anyhow::anyhow!(
            "No credential configured. Set credential.token or ${}",
            config.credential.token_env
        )
    })?;

    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(
        &config.timeouts,
        config.server.upstream_proxy.as_deref(),
    )?);

    let container = Arc::new(ProxyContainer::new());
    let page = Arc::new(Page::new(Arc::clone(&container), Arc::clone(&transport)));

    let credentials = Arc::new(TokenBroker::new());
    credentials.set(credential);

    let options = RegistrationOptions {
        scope: config.interception.scope.clone(),
        rules: config.interception.rules(),
        credential_timeout: config.interception.credential_timeout(),
        transport,
    };
    let sync = CredentialSync::new(Arc::clone(&container), credentials);
    let controller = sync.run(container.register(options)).await?;
    tracing::info!("Proxy {} controls scope {}", controller.id(), controller.scope());

    Ok(page)
}
