//! Persisted config types (shared between the app and any view client).

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level persisted config. Hand-editable TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicTacDogConfig {
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub api: ApiSection,
    /// Push hub. Absent = no live updates, the match is only refreshed on
    /// explicit reload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hub: Option<HubSection>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub webserver: HashMap<String, WebserverSection>,
}

/// Who is playing whom. Supplied by the surrounding chat session; the ids
/// are opaque and only ever compared for equality.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSection {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub opponent_id: String,
    /// Bearer token forwarded to the store and the hub.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// External match store (chat backend REST API).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiSection {
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    10
}

impl ApiSection {
    /// Limit for one store request.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5266".into(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Real-time push hub (SignalR JSON protocol over WebSocket).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubSection {
    pub url: String,
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,
}

fn default_keepalive_secs() -> u64 {
    15
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebserverSection {
    #[serde(default)]
    pub name: String,
    pub bind: String,
}

impl Default for TicTacDogConfig {
    /// Known good defaults: the chat backend on localhost and a local
    /// control server.
    fn default() -> Self {
        let mut webserver = HashMap::new();
        webserver.insert(
            "0".into(),
            WebserverSection {
                name: "Web Server".into(),
                bind: "127.0.0.1:3030".into(),
            },
        );
        Self {
            session: SessionSection::default(),
            api: ApiSection::default(),
            hub: Some(HubSection {
                url: "http://localhost:5266/chatHub".into(),
                keepalive_secs: default_keepalive_secs(),
            }),
            webserver,
        }
    }
}
