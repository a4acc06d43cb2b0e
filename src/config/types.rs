use crate::pool::Upstream;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

fn default_port() -> u16 {
    32000
}

fn default_request_timeout_seconds() -> u64 {
    120
}

/// File-backed configuration for the proxy pool: port, per-attempt
/// timeout, and pool membership (§6 "CLI/config surface"). This is the
/// default `ConfigProvider` implementation; embedders with their own
/// config layer (the menu-bar app's real settings store) implement the
/// trait directly instead of going through this type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,

    #[serde(default)]
    pub pool: Vec<UpstreamConfig>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            request_timeout_seconds: default_request_timeout_seconds(),
            pool: Vec::new(),
        }
    }
}

/// One pool member as written in the config file. `id` is optional in the
/// file — a stable identity is generated and retained in memory for
/// entries that omit it, since the wire format only needs to be convenient
/// to hand-author.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub name: String,
    pub base_url: String,
    pub credential: String,
    #[serde(default)]
    pub static_priority: i64,
}

impl From<&UpstreamConfig> for Upstream {
    fn from(cfg: &UpstreamConfig) -> Self {
        Upstream {
            id: cfg.id.unwrap_or_else(Uuid::new_v4),
            name: cfg.name.clone(),
            base_url: cfg.base_url.clone(),
            credential: cfg.credential.clone(),
            static_priority: cfg.static_priority,
        }
    }
}
