//! Tracker - composition root owning the registries and the hub
//!
//! The node registry and the transaction ledger live together behind one
//! lock, so a reset swaps both at once and every publish sees a consistent
//! pair. Reads that started before a reset finish against the old pair.

use crate::{
    broadcast::{BroadcastHub, DeliveryError, Subscriber, SubscriberId},
    node_registry::{Node, NodeId, NodeRegistry, DEFAULT_MAX_NODE_ID},
    snapshot::Snapshot,
    transaction_ledger::{Transaction, TransactionLedger},
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{
    sync::{Arc, Weak},
    time::Duration,
};

/// The registry pair replaced wholesale on reset
#[derive(Clone, Debug, Default)]
pub struct Registries {
    pub nodes: NodeRegistry,
    pub ledger: TransactionLedger,
}

impl Registries {
    /// Empty registries whose node registry accepts ids up to `max_node_id`
    pub fn with_max_node_id(max_node_id: NodeId) -> Self {
        Self {
            nodes: NodeRegistry::with_max_id(max_node_id),
            ledger: TransactionLedger::new(),
        }
    }
}

/// Registered/running counts
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub registered: usize,
    pub running: usize,
}

/// Tracker state shared by the HTTP adapter and the heartbeat
pub struct Tracker {
    registries: RwLock<Registries>,
    hub: BroadcastHub,
}

impl Tracker {
    /// Create a tracker with empty registries and no subscribers
    pub fn new() -> Self {
        Self::with_max_node_id(DEFAULT_MAX_NODE_ID)
    }

    /// Create a tracker that rejects node ids above `max_node_id`
    pub fn with_max_node_id(max_node_id: NodeId) -> Self {
        Self {
            registries: RwLock::new(Registries::with_max_node_id(max_node_id)),
            hub: BroadcastHub::new(),
        }
    }

    /// Highest node id the registry accepts
    pub fn max_node_id(&self) -> NodeId {
        self.registries.read().nodes.max_id()
    }

    /// Register (or re-register) a node, `None` if `id` is above the max id
    pub fn register_node(
        &self,
        id: NodeId,
        address: impl Into<String>,
        port: u16,
        public_key: impl Into<String>,
    ) -> Option<NodeId> {
        self.registries
            .write()
            .nodes
            .register_node(id, address, port, public_key)
    }

    /// Update an existing node, false if `id` is not registered
    pub fn update_node(
        &self,
        id: NodeId,
        address: impl Into<String>,
        port: u16,
        public_key: impl Into<String>,
    ) -> bool {
        self.registries
            .write()
            .nodes
            .update_node(id, address, port, public_key)
    }

    /// Set a node's running flag, false if `id` is not registered
    pub fn set_node_status(&self, id: NodeId, running: bool) -> bool {
        self.registries.write().nodes.set_node_status(id, running)
    }

    /// Append a transaction to the ledger
    pub fn add_transaction(&self, tx: Transaction) {
        self.registries.write().ledger.add_transaction(tx);
    }

    /// Get a copy of a node
    pub fn get_node(&self, id: NodeId) -> Option<Node> {
        self.registries.read().nodes.get_node(id).cloned()
    }

    /// Copy of the index-aligned node view, holes included
    pub fn nodes(&self) -> Vec<Option<Node>> {
        self.registries
            .read()
            .nodes
            .get_nodes()
            .into_iter()
            .map(|slot| slot.cloned())
            .collect()
    }

    /// Registered and running node counts
    pub fn status(&self) -> Status {
        let registries = self.registries.read();
        Status {
            registered: registries.nodes.get_size(),
            running: registries.nodes.get_running(),
        }
    }

    /// Capture the current snapshot
    pub fn snapshot(&self) -> Snapshot {
        let registries = self.registries.read();
        Snapshot::capture(&registries.nodes, &registries.ledger)
    }

    /// Run a read-only closure against the current registries
    pub fn read<R>(&self, f: impl FnOnce(&Registries) -> R) -> R {
        f(&self.registries.read())
    }

    /// Drop all nodes and transactions. Subscribers stay attached.
    pub fn reset(&self) {
        let mut registries = self.registries.write();
        let fresh = Registries::with_max_node_id(registries.nodes.max_id());
        let previous = std::mem::replace(&mut *registries, fresh);
        drop(registries);
        tracing::info!(
            "Tracker reset ({} nodes, {} transactions discarded)",
            previous.nodes.get_size(),
            previous.ledger.len()
        );
    }

    /// Attach an observer
    pub fn subscribe(
        &self,
        subscriber: Box<dyn Subscriber>,
    ) -> Result<SubscriberId, DeliveryError> {
        self.hub.subscribe(subscriber)
    }

    /// Detach an observer
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.hub.unsubscribe(id)
    }

    /// Push the current snapshot to every observer
    pub fn publish_update(&self) -> usize {
        self.hub.publish_with(|| self.snapshot())
    }

    /// Start re-publishing the snapshot on a timer.
    ///
    /// The timer holds only a weak reference and ends once the tracker is
    /// dropped. Returns false if a heartbeat is already running.
    pub fn start_heartbeat(self: &Arc<Self>, interval: Option<Duration>) -> bool {
        let tracker: Weak<Self> = Arc::downgrade(self);
        self.hub.start_heartbeat(interval, move || match tracker.upgrade() {
            Some(tracker) => {
                tracker.publish_update();
                true
            }
            None => false,
        })
    }

    /// Stop the heartbeat timer
    pub fn stop_heartbeat(&self) -> bool {
        self.hub.stop_heartbeat()
    }

    /// Get the broadcast hub
    pub fn hub(&self) -> &BroadcastHub {
        &self.hub
    }
}

impl Default for Tracker {
    fn default() -> Self {
        Self::new()
    }
}
