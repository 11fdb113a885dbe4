//! A node's local view of the ring topology.

use crate::finger::FingerTable;
use corelib::NodeInfo;
use serde::{Deserialize, Serialize};

/// Ring membership as seen by the node itself.
///
/// Departure is never self-announced; peers detect it through failed probes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Membership {
    /// Has a successor but no accepted notify yet.
    Joining,
    Stable,
}

/// Successor, predecessor and fingers of one node.
///
/// Always accessed under the node's pointer lock, so a stabilization update
/// and a concurrent `notify` never interleave.
#[derive(Clone, Debug)]
pub struct RingPointers {
    pub predecessor: Option<NodeInfo>,
    pub successor: NodeInfo,
    pub fingers: FingerTable,
    pub membership: Membership,
    /// Round-robin cursor for finger refreshes.
    next_finger: usize,
}

impl RingPointers {
    /// Pointers of a node alone on its ring.
    pub fn solitary(owner: &NodeInfo, bits: u8) -> Self {
        Self {
            predecessor: None,
            successor: owner.clone(),
            fingers: FingerTable::new(owner, bits),
            membership: Membership::Joining,
            next_finger: 1,
        }
    }

    /// Replaces the successor; finger 0 always mirrors it.
    pub fn set_successor(&mut self, successor: NodeInfo) {
        self.fingers.set(0, successor.clone());
        self.successor = successor;
    }

    /// Next `count` finger indices to refresh.
    ///
    /// Finger 0 is skipped since it follows the successor.
    pub fn next_finger_indices(&mut self, count: usize) -> Vec<usize> {
        let len = self.fingers.len();
        if len <= 1 {
            return Vec::new();
        }
        let count = count.min(len - 1);
        let mut indices = Vec::with_capacity(count);
        for _ in 0..count {
            if self.next_finger >= len {
                self.next_finger = 1;
            }
            indices.push(self.next_finger);
            self.next_finger += 1;
        }
        indices
    }
}
