//! Tracker Core - node registry, transaction ledger and snapshot broadcast
//!
//! This crate holds all state of the tracker service:
//! - Sparse node registry keyed by caller-assigned ids
//! - Append-only transaction ledger with graph/aggregate views
//! - Broadcast hub pushing full snapshots to observers, plus a heartbeat
//! - `Tracker`, the composition root tying the three together

pub mod broadcast;
pub mod node_registry;
pub mod snapshot;
pub mod tracker;
pub mod transaction_ledger;

#[cfg(test)]
mod tests;

pub use broadcast::{
    BroadcastHub, DeliveryError, HubStats, Subscriber, SubscriberId, SubscriberState,
};
pub use node_registry::{
    GraphNode, Node, NodeId, NodeRegistry, DEFAULT_MAX_NODE_ID, MAX_NODE_ID_CEILING,
};
pub use snapshot::Snapshot;
pub use tracker::{Registries, Status, Tracker};
pub use transaction_ledger::{GraphEdge, LedgerNumbers, Transaction, TransactionLedger};

/// Default heartbeat interval in seconds
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 10;
