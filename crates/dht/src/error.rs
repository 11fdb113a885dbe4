//! Error types for the ring engine.

use corelib::NodeAddr;
use thiserror::Error;

/// Result type alias for the ring engine.
pub type Result<T> = std::result::Result<T, DhtError>;

/// Errors surfaced by the ring engine.
///
/// Absence of a key and a rejected `notify` are not errors; they are
/// modelled as empty values and [`NotifyOutcome::Rejected`](crate::NotifyOutcome)
/// respectively.
#[derive(Debug, Error)]
pub enum DhtError {
    /// The peer did not answer: connection failure or timeout.
    #[error("{op}: peer {addr} unreachable")]
    Unreachable { op: &'static str, addr: NodeAddr },

    /// The named remote operation failed (non-success status, malformed
    /// reply, or a lookup that could not be completed).
    #[error("Failed(\"{0}\")")]
    Failed(String),

    /// The contacted node no longer owns the key; a handoff moved it to a
    /// node counter-clockwise of `0`.
    #[error("{0} does not own the key")]
    NotOwner(NodeAddr),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Core(#[from] corelib::Error),
}

impl DhtError {
    /// Collapses any remote failure into the named `Failed(op)` form
    /// reported to lookup callers.
    pub fn into_failed(self, op: &str) -> Self {
        match self {
            DhtError::Failed(_) => self,
            _ => DhtError::Failed(op.to_string()),
        }
    }

    /// True if the peer could not be reached at all.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, DhtError::Unreachable { .. })
    }
}
