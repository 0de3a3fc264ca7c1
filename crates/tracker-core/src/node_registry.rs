//! Sparse node registry keyed by caller-assigned ids
//!
//! Ids need not be contiguous. An id that was never registered is a hole:
//! it is absent from the map, never a placeholder record.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Node identifier, assigned by the node itself
pub type NodeId = u32;

/// Highest id a registry accepts unless configured otherwise
pub const DEFAULT_MAX_NODE_ID: NodeId = 65_535;

/// Upper limit for any configured max id. The index-aligned view allocates
/// one slot per id up to the highest registered one.
pub const MAX_NODE_ID_CEILING: NodeId = 1 << 20;

/// A tracked worker node
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    pub address: String,
    pub port: u16,
    pub public_key: String,
    pub running: bool,
}

impl Node {
    /// Create a node that has not reported itself running yet
    pub fn new(id: NodeId, address: String, port: u16, public_key: String) -> Self {
        Self {
            id,
            address,
            port,
            public_key,
            running: false,
        }
    }
}

/// Graph vertex sent to observers
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: NodeId,
    pub label: String,
}

/// Registry of known nodes
///
/// Every present id maps to exactly one [`Node`]. Counting and enumeration
/// skip holes. Ids above `max_id` are never stored.
#[derive(Clone, Debug)]
pub struct NodeRegistry {
    nodes: BTreeMap<NodeId, Node>,
    max_id: NodeId,
}

impl NodeRegistry {
    /// Create an empty registry accepting ids up to [`DEFAULT_MAX_NODE_ID`]
    pub fn new() -> Self {
        Self::with_max_id(DEFAULT_MAX_NODE_ID)
    }

    /// Create an empty registry accepting ids up to `max_id`, clamped to
    /// [`MAX_NODE_ID_CEILING`]
    pub fn with_max_id(max_id: NodeId) -> Self {
        Self {
            nodes: BTreeMap::new(),
            max_id: max_id.min(MAX_NODE_ID_CEILING),
        }
    }

    /// Highest id this registry accepts
    pub fn max_id(&self) -> NodeId {
        self.max_id
    }

    /// Register a node, replacing any record already stored under `id`.
    ///
    /// Returns `None` (and stores nothing) when `id` is above the max id.
    pub fn register_node(
        &mut self,
        id: NodeId,
        address: impl Into<String>,
        port: u16,
        public_key: impl Into<String>,
    ) -> Option<NodeId> {
        if id > self.max_id {
            tracing::warn!("Rejected node {} above max id {}", id, self.max_id);
            return None;
        }

        let node = Node::new(id, address.into(), port, public_key.into());
        if self.nodes.insert(id, node).is_some() {
            tracing::debug!("Re-registered node {}", id);
        } else {
            tracing::debug!("Registered node {}", id);
        }
        Some(id)
    }

    /// Update the network location and key of an existing node.
    ///
    /// Returns false (and changes nothing) when `id` is a hole. The running
    /// flag is left untouched.
    pub fn update_node(
        &mut self,
        id: NodeId,
        address: impl Into<String>,
        port: u16,
        public_key: impl Into<String>,
    ) -> bool {
        match self.nodes.get_mut(&id) {
            Some(node) => {
                node.address = address.into();
                node.port = port;
                node.public_key = public_key.into();
                true
            }
            None => false,
        }
    }

    /// Set the running flag of a node, false if `id` is a hole
    pub fn set_node_status(&mut self, id: NodeId, running: bool) -> bool {
        match self.nodes.get_mut(&id) {
            Some(node) => {
                node.running = running;
                true
            }
            None => false,
        }
    }

    /// Get a node by id
    pub fn get_node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Index-aligned view of the registry, holes included.
    ///
    /// Slot `i` holds the node with id `i`. The view ends at the highest
    /// registered id, so an empty registry yields an empty vector.
    pub fn get_nodes(&self) -> Vec<Option<&Node>> {
        let Some(&max_id) = self.nodes.keys().next_back() else {
            return Vec::new();
        };

        let mut slots = vec![None; max_id as usize + 1];
        for (id, node) in &self.nodes {
            slots[*id as usize] = Some(node);
        }
        slots
    }

    /// Number of registered nodes
    pub fn get_size(&self) -> usize {
        self.nodes.len()
    }

    /// Number of registered nodes currently marked running
    pub fn get_running(&self) -> usize {
        self.nodes.values().filter(|node| node.running).count()
    }

    /// Graph vertices in ascending id order
    pub fn get_graph_nodes(&self) -> Vec<GraphNode> {
        self.nodes
            .keys()
            .map(|id| GraphNode {
                id: *id,
                label: id.to_string(),
            })
            .collect()
    }

    /// Check if no node is registered
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
