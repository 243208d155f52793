//! Foreground → proxy message protocol

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::broker::Credential;

/// `{ "action": "sync-token", "token": "..." }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum ProxyMessage {
    SyncToken { token: Credential },
}

impl ProxyMessage {
    /// Parse a posted payload. Unknown actions and malformed data yield `None`.
    pub fn parse(data: &Value) -> Option<Self> {
        if data.is_null() {
            return None;
        }
        match serde_json::from_value(data.clone()) {
            Ok(message) => Some(message),
            Err(e) => {
                tracing::debug!("Ignoring proxy message: {}", e);
                None
            }
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Self::SyncToken { token } => serde_json::json!({
                "action": "sync-token",
                "token": token.expose(),
            }),
        }
    }
}
