use std::path::PathBuf;

use bearer_relay_core::config::load_config;
use bearer_relay_core::origin::OriginServer;

pub async fn run(config_path: Option<PathBuf>, port_override: Option<u16>) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;

    if let Some(port) = port_override {
        config.origin.port = port;
    }

    let server = OriginServer::new(
        config.origin.host.clone(),
        config.origin.port,
        &config.origin.api_key_sha256,
    );

    tracing::info!("Origin server starting on http://{}:{}", config.origin.host, config.origin.port);
    server.run().await?;

    Ok(())
}
