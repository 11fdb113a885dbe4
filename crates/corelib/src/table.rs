//! Key/value batches exchanged between nodes.

use crate::node::NodeInfo;
use serde::{Deserialize, Serialize};

/// One key's bindings at a node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRow {
    pub key: String,
    /// Set-valued: no duplicates, order irrelevant.
    pub vals: Vec<String>,
}

impl TableRow {
    pub fn new(key: impl Into<String>, vals: Vec<String>) -> Self {
        Self {
            key: key.into(),
            vals,
        }
    }
}

/// A batch of bindings tagged with the node it speaks for.
///
/// Sent as the candidate's self-description in `notify` and returned as the
/// handoff batch when the candidate is accepted. Keys within a batch are
/// unique; entry order carries no meaning.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRep {
    pub owner: NodeInfo,
    pub entries: Vec<TableRow>,
}

impl TableRep {
    /// An empty batch for `owner`.
    pub fn new(owner: NodeInfo) -> Self {
        Self {
            owner,
            entries: Vec::new(),
        }
    }

    pub fn with_entries(owner: NodeInfo, entries: Vec<TableRow>) -> Self {
        Self { owner, entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Total number of key/value bindings across all rows.
    pub fn binding_count(&self) -> usize {
        self.entries.iter().map(|row| row.vals.len()).sum()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|row| row.key.as_str())
    }
}
