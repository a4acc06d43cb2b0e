pub mod types;

#[cfg(test)]
mod tests;

pub use types::*;

use crate::pool::{ConfigProvider, Upstream};
use anyhow::{bail, Result};
use std::path::Path;

impl ProxyConfig {
    /// Load configuration from a file (if it exists), apply environment
    /// overrides, and validate. When the file does not exist, built-in
    /// defaults are used (port 32000, 120s timeout, empty pool) — the proxy
    /// simply has nothing to dispatch to until the pool is populated.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config: ProxyConfig = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            match path.extension().and_then(|e| e.to_str()) {
                Some("toml") => toml::from_str(&content)?,
                Some("json") => serde_json::from_str(&content)?,
                Some(ext) => bail!("unsupported config format: .{ext}, use .toml or .json"),
                None => bail!("config file has no extension, use .toml or .json"),
            }
        } else {
            tracing::info!(
                path = %path.display(),
                "config file not found, using defaults"
            );
            ProxyConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        tracing::info!(pool_size = config.pool.len(), "loaded proxy pool configuration");
        Ok(config)
    }

    /// Environment overrides for the handful of settings worth tuning
    /// without editing the file: port and per-attempt timeout. Pool
    /// membership (credentials included) is deliberately not overridable
    /// this way — it belongs in the config file, not the environment.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SWITCHBOARD_PORT") {
            if let Ok(port) = v.parse::<u16>() {
                self.port = port;
            }
        }
        if let Ok(v) = std::env::var("SWITCHBOARD_REQUEST_TIMEOUT_SECONDS") {
            if let Ok(secs) = v.parse::<u64>() {
                self.request_timeout_seconds = secs;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(10..=600).contains(&self.request_timeout_seconds) {
            bail!(
                "request_timeout_seconds must be in [10, 600], got {}",
                self.request_timeout_seconds
            );
        }
        for upstream in &self.pool {
            if upstream.name.is_empty() {
                bail!("pool entry has an empty name");
            }
            if upstream.base_url.is_empty() {
                bail!("pool entry {:?} has an empty base_url", upstream.name);
            }
        }
        Ok(())
    }
}

/// The default, file-backed `ConfigProvider`. Eligibility filtering (empty
/// credential, malformed `base_url`) happens downstream in
/// `pool::registry::capture_snapshot`, not here — this type's job is only to
/// surface the raw configured pool.
impl ConfigProvider for ProxyConfig {
    fn snapshot_pool(&self) -> Vec<Upstream> {
        self.pool.iter().map(Upstream::from).collect()
    }

    fn port(&self) -> u16 {
        self.port
    }

    fn request_timeout_seconds(&self) -> u64 {
        self.request_timeout_seconds
    }
}
