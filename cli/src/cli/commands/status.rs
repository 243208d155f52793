use std::path::PathBuf;

use bearer_relay_core::config::{default_config_path, load_config};

pub async fn run(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;

    println!("bearer-relay Status");
    println!("===================");
    println!();
    println!("Configuration:");
    println!("  Config file: {:?}", default_config_path());
    println!();
    println!("Server settings:");
    println!("  Host: {}", config.server.bind_address());
    println!("  Port: {}", config.server.port);
    println!("  Upstream: {}", config.server.upstream);
    println!();
    println!("Interception:");
    println!("  Scope: {}", config.interception.scope);
    println!("  Protected prefix: {}", config.interception.protected_prefix);
    println!("  Opt-out marker: {}", config.interception.opt_out_marker);
    println!("  Credential timeout: {}ms", config.interception.credential_timeout_ms);
    println!("  Retry marker: {}", config.retry.marker);
    println!();

    let credential = if config.credential.resolve().is_some() {
        "configured"
    } else {
        "MISSING"
    };
    println!("Credential: {} (env: ${})", credential, config.credential.token_env);

    // Check if server is reachable
    println!();
    let url = format!("http://{}:{}/healthz", config.server.bind_address(), config.server.port);
    match reqwest::get(&url).await {
        Ok(resp) if resp.status().is_success() => {
            let state = resp
                .json::<serde_json::Value>()
                .await
                .ok()
                .and_then(|body| body.get("proxy").and_then(|v| v.as_str()).map(str::to_string))
                .unwrap_or_else(|| "unknown".to_string());
            println!("Server: RUNNING ✓ (proxy {})", state);
        }
        _ => {
            println!("Server: NOT RUNNING");
        }
    }

    Ok(())
}
