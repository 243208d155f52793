use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::broker::Credential;
use crate::page::retry::DEFAULT_RETRY_MARKER;
use crate::proxy::interceptor::{InterceptionRules, DEFAULT_OPT_OUT_MARKER, DEFAULT_PROTECTED_PREFIX};

/// bearer-relay configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub interception: InterceptionConfig,

    #[serde(default)]
    pub credential: CredentialConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub origin: OriginConfig,

    #[serde(default)]
    pub timeouts: TimeoutsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default)]
    pub allow_lan_access: bool,

    /// Base URL requests arriving at the ingress are forwarded to
    #[serde(default = "default_upstream")]
    pub upstream: String,

    #[serde(default)]
    pub upstream_proxy: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            allow_lan_access: false,
            upstream: default_upstream(),
            upstream_proxy: None,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> &str {
        if self.allow_lan_access {
            "0.0.0.0"
        } else {
            &self.host
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterceptionConfig {
    #[serde(default = "default_scope")]
    pub scope: String,

    #[serde(default = "default_protected_prefix")]
    pub protected_prefix: String,

    #[serde(default = "default_opt_out_marker")]
    pub opt_out_marker: String,

    /// 0 waits for the credential indefinitely
    #[serde(default = "default_credential_timeout_ms")]
    pub credential_timeout_ms: u64,
}

impl Default for InterceptionConfig {
    fn default() -> Self {
        Self {
            scope: default_scope(),
            protected_prefix: default_protected_prefix(),
            opt_out_marker: default_opt_out_marker(),
            credential_timeout_ms: default_credential_timeout_ms(),
        }
    }
}

impl InterceptionConfig {
    pub fn rules(&self) -> InterceptionRules {
        InterceptionRules {
            protected_prefix: self.protected_prefix.clone(),
            opt_out_marker: self.opt_out_marker.clone(),
        }
    }

    pub fn credential_timeout(&self) -> Duration {
        Duration::from_millis(self.credential_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialConfig {
    #[serde(default)]
    pub token: Option<String>,

    /// Environment variable consulted when `token` is unset
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            token: None,
            token_env: default_token_env(),
        }
    }
}

impl CredentialConfig {
    pub fn resolve(&self) -> Option<Credential> {
        self.token
            .clone()
            .or_else(|| std::env::var(&self.token_env).ok())
            .filter(|token| !token.is_empty())
            .map(Credential::new)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_retry_marker")]
    pub marker: String,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            marker: default_retry_marker(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginConfig {
    #[serde(default = "default_origin_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Hex SHA-256 of the accepted API key (see `bearer-relay hash-key`)
    #[serde(default)]
    pub api_key_sha256: String,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            port: default_origin_port(),
            host: default_host(),
            api_key_sha256: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            request_timeout: default_request_timeout(),
        }
    }
}

// Default value functions
fn default_port() -> u16 { 8045 }
fn default_origin_port() -> u16 { 8080 }
fn default_host() -> String { "127.0.0.1".to_string() }
fn default_upstream() -> String { "http://127.0.0.1:8080".to_string() }
fn default_scope() -> String { "/".to_string() }
fn default_protected_prefix() -> String { DEFAULT_PROTECTED_PREFIX.to_string() }
fn default_opt_out_marker() -> String { DEFAULT_OPT_OUT_MARKER.to_string() }
fn default_credential_timeout_ms() -> u64 { 3000 }
fn default_token_env() -> String { "BEARER_RELAY_TOKEN".to_string() }
fn default_retry_marker() -> String { DEFAULT_RETRY_MARKER.to_string() }
fn default_connect_timeout() -> u64 { 20 }
fn default_request_timeout() -> u64 { 120 }

/// Get default config file path
/// Uses ~/.config/bearer-relay/config.toml
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("bearer-relay")
        .join("config.toml")
}

/// Load config from file, or return defaults if not found.
///
/// Loading order:
/// 1. Specified path (if provided)
/// 2. ./config.toml (if exists)
/// 3. default_config_path() (usually ~/.config/bearer-relay/config.toml)
pub fn load_config(path: Option<PathBuf>) -> anyhow::Result<Config> {
    if let Some(config_path) = path {
        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content)?;
            tracing::info!("Loaded config from specified path {:?}", config_path);
            return Ok(config);
        } else {
            anyhow::bail!("Specified config file not found: {:?}", config_path);
        }
    }

    // Try current directory config.toml
    let local_config = PathBuf::from("config.toml");
    if local_config.exists() {
        match std::fs::read_to_string(&local_config) {
            Ok(content) => {
                match toml::from_str::<Config>(&content) {
                    Ok(config) => {
                        tracing::info!("Loaded config from current directory {:?}", local_config);
                        return Ok(config);
                    }
                    Err(e) => {
                        tracing::error!("Failed to parse ./config.toml: {}. Falling back to default path.", e);
                    }
                }
            }
            Err(e) => {
                tracing::error!("Failed to read ./config.toml: {}. Falling back to default path.", e);
            }
        }
    }

    let default_path = default_config_path();
    if default_path.exists() {
        let content = std::fs::read_to_string(&default_path)?;
        let config: Config = toml::from_str(&content)?;
        tracing::info!("Loaded config from default path {:?}", default_path);
        Ok(config)
    } else {
        tracing::info!("No config file found, using defaults");
        Ok(Config::default())
    }
}
