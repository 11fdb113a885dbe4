//! Finger (routing) table.
//!
//! Entry `i` of node `n` points at the successor of `(n + 2^i) mod 2^M`.
//! Entries start out pointing at the owner and are filled in by the
//! stabilization task; a stale entry only costs extra hops, never
//! correctness, because every hop must make strict clockwise progress.

use corelib::{Id, IdentifierSpace, NodeInfo};

#[derive(Clone, Debug)]
pub struct FingerTable {
    entries: Vec<NodeInfo>,
}

impl FingerTable {
    /// A table of `bits` entries all pointing at `owner`.
    pub fn new(owner: &NodeInfo, bits: u8) -> Self {
        Self {
            entries: vec![owner.clone(); usize::from(bits)],
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&NodeInfo> {
        self.entries.get(index)
    }

    /// Overwrites entry `index`; returns false if out of range.
    pub fn set(&mut self, index: usize, node: NodeInfo) -> bool {
        match self.entries.get_mut(index) {
            Some(slot) => {
                *slot = node;
                true
            }
            None => false,
        }
    }

    pub fn entries(&self) -> &[NodeInfo] {
        &self.entries
    }

    /// Highest finger strictly between `owner` and `target`, or `owner`
    /// itself if none qualifies.
    ///
    /// Scanning from the far end makes the answer the largest jump that does
    /// not overshoot the target.
    pub fn closest_preceding(&self, space: &IdentifierSpace, owner: &NodeInfo, target: Id) -> NodeInfo {
        self.entries
            .iter()
            .rev()
            .find(|finger| space.between(owner.id, finger.id, target))
            .cloned()
            .unwrap_or_else(|| owner.clone())
    }

    /// Points every entry referencing `failed` back at `owner`.
    ///
    /// Returns the number of entries reset.
    pub fn evict(&mut self, failed: &NodeInfo, owner: &NodeInfo) -> usize {
        let mut evicted = 0;
        for entry in self.entries.iter_mut() {
            if *entry == *failed {
                *entry = owner.clone();
                evicted += 1;
            }
        }
        evicted
    }

    /// Distinct entries other than `owner`, nearest first.
    pub fn distinct_peers(&self, owner: &NodeInfo) -> Vec<NodeInfo> {
        let mut peers: Vec<NodeInfo> = Vec::new();
        for entry in &self.entries {
            if entry != owner && !peers.contains(entry) {
                peers.push(entry.clone());
            }
        }
        peers
    }
}
