//! Tracker Configuration

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracker_core::{
    NodeId, DEFAULT_HEARTBEAT_INTERVAL_SECS, DEFAULT_MAX_NODE_ID, MAX_NODE_ID_CEILING,
};
use tracker_server::ServerConfig;

/// Tracker configuration, read from an optional TOML file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// HTTP bind address
    pub http_addr: String,
    /// Heartbeat interval in seconds
    pub heartbeat_interval_secs: u64,
    /// Queued events per SSE observer
    pub subscriber_buffer: usize,
    /// Highest node id accepted from clients, at most `MAX_NODE_ID_CEILING`
    pub max_node_id: NodeId,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        let server = ServerConfig::default();
        Self {
            http_addr: server.http_addr,
            heartbeat_interval_secs: DEFAULT_HEARTBEAT_INTERVAL_SECS,
            subscriber_buffer: server.subscriber_buffer,
            max_node_id: DEFAULT_MAX_NODE_ID,
            log_level: "info".to_string(),
        }
    }
}

impl TrackerConfig {
    /// Load a config file; missing keys keep their defaults
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the tracker cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.max_node_id <= MAX_NODE_ID_CEILING,
            "max_node_id {} exceeds the limit of {}",
            self.max_node_id,
            MAX_NODE_ID_CEILING
        );
        Ok(())
    }

    /// Adapter subset of the config
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            http_addr: self.http_addr.clone(),
            subscriber_buffer: self.subscriber_buffer,
        }
    }
}
