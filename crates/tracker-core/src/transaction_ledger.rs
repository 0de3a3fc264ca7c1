//! Append-only transaction ledger

use crate::node_registry::NodeId;
use serde::{Deserialize, Serialize};

/// Value transfer between two nodes.
///
/// `from` and `to` are not checked against the node registry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub from: NodeId,
    pub to: NodeId,
    pub amount: u64,
    pub remainder: u64,
    pub number_of_chains: u64,
    pub number_of_blocks: u64,
}

/// Directed graph edge sent to observers, one per transaction
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    pub from: NodeId,
    pub to: NodeId,
    pub amount: u64,
    pub remainder: u64,
    pub number_of_chains: u64,
    pub number_of_blocks: u64,
}

impl From<&Transaction> for GraphEdge {
    fn from(tx: &Transaction) -> Self {
        Self {
            from: tx.from,
            to: tx.to,
            amount: tx.amount,
            remainder: tx.remainder,
            number_of_chains: tx.number_of_chains,
            number_of_blocks: tx.number_of_blocks,
        }
    }
}

/// Aggregate counters over the whole ledger
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerNumbers {
    pub transactions: usize,
    pub total_amount: u64,
    pub total_remainder: u64,
    pub total_chains: u64,
    pub total_blocks: u64,
    /// Mean chains per transaction, 0 when empty
    pub average_chains: f64,
    /// Mean blocks per transaction, 0 when empty
    pub average_blocks: f64,
}

/// Ordered transaction history. Insertion order is the only ordering.
#[derive(Clone, Debug, Default)]
pub struct TransactionLedger {
    transactions: Vec<Transaction>,
}

impl TransactionLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a transaction
    pub fn add_transaction(&mut self, tx: Transaction) {
        tracing::debug!(
            "Recorded transaction {} -> {} (amount {})",
            tx.from,
            tx.to,
            tx.amount
        );
        self.transactions.push(tx);
    }

    /// One edge per transaction, in insertion order
    pub fn get_graph_edges(&self) -> Vec<GraphEdge> {
        self.transactions.iter().map(GraphEdge::from).collect()
    }

    /// Roll the ledger up into aggregate counters
    pub fn get_numbers(&self) -> LedgerNumbers {
        let mut numbers = LedgerNumbers {
            transactions: self.transactions.len(),
            ..Default::default()
        };

        for tx in &self.transactions {
            numbers.total_amount = numbers.total_amount.saturating_add(tx.amount);
            numbers.total_remainder = numbers.total_remainder.saturating_add(tx.remainder);
            numbers.total_chains = numbers.total_chains.saturating_add(tx.number_of_chains);
            numbers.total_blocks = numbers.total_blocks.saturating_add(tx.number_of_blocks);
        }

        if numbers.transactions > 0 {
            let count = numbers.transactions as f64;
            numbers.average_chains = numbers.total_chains as f64 / count;
            numbers.average_blocks = numbers.total_blocks as f64 / count;
        }

        numbers
    }

    /// All transactions in insertion order
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Number of recorded transactions
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// Check if the ledger is empty
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}
