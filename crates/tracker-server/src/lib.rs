//! Tracker Server - HTTP adapter for the tracker core
//!
//! Exposes the tracker over HTTP:
//! - JSON routes: register-node, update-node, set-node-status, node, status, reset
//! - Transactions: register-transaction
//! - Server-sent events: /topn/updates streams a full snapshot on every publish

pub mod http_server;
pub mod methods;
pub mod subscriptions;

pub use http_server::HttpTrackerServer;
pub use methods::{ApiError, TrackerContext};
pub use subscriptions::{SnapshotStream, SseSubscriber};

// Re-export types that consumers might need
pub use tracker_core::{NodeId, Tracker};

/// Adapter configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// HTTP bind address
    pub http_addr: String,
    /// Queued events per SSE observer before it counts as too slow
    pub subscriber_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: "127.0.0.1:3000".to_string(),
            subscriber_buffer: 64,
        }
    }
}
