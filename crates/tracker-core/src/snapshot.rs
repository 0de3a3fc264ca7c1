//! Snapshot - the full derived view pushed to observers

use crate::{
    node_registry::{GraphNode, NodeRegistry},
    transaction_ledger::{GraphEdge, LedgerNumbers, TransactionLedger},
};
use serde::{Deserialize, Serialize};

/// Complete graph view. Every publish carries one of these, never a diff.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub numbers: LedgerNumbers,
}

impl Snapshot {
    /// Capture the current view of a registry and a ledger
    pub fn capture(nodes: &NodeRegistry, ledger: &TransactionLedger) -> Self {
        Self {
            nodes: nodes.get_graph_nodes(),
            edges: ledger.get_graph_edges(),
            numbers: ledger.get_numbers(),
        }
    }

    /// Serialize to the JSON payload observers receive
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
