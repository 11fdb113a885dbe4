//! Node abstractions for the identifier ring.
//!
//! A ring participant is identified by its [`Id`] and reached through an
//! opaque [`NodeAddr`]. Both are cheap to clone and compare.

use crate::error::{Error, Result};
use crate::id::Id;
use crate::ring::IdentifierSpace;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Transport-level endpoint of a node.
///
/// The core never interprets it; transports decide what it means
/// (`host:port` for TCP, any unique name for the in-process network).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeAddr(pub String);

impl NodeAddr {
    pub fn new(addr: impl Into<String>) -> Self {
        NodeAddr(addr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeAddr {
    fn from(addr: &str) -> Self {
        NodeAddr(addr.to_string())
    }
}

impl From<String> for NodeAddr {
    fn from(addr: String) -> Self {
        NodeAddr(addr)
    }
}

/// Identity of a ring participant.
///
/// Immutable once built. Two values are equal iff their ids are equal; the
/// address only tells how to reach the node.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeInfo {
    pub id: Id,
    pub addr: NodeAddr,
}

impl NodeInfo {
    /// Construct node info from an explicit id.
    pub fn new(id: Id, addr: impl Into<NodeAddr>) -> Self {
        Self {
            id,
            addr: addr.into(),
        }
    }

    /// Construct node info checking that `id` fits the ring.
    pub fn checked(space: &IdentifierSpace, id: Id, addr: impl Into<NodeAddr>) -> Result<Self> {
        let addr = addr.into();
        if addr.0.is_empty() {
            return Err(Error::InvalidNode("empty address".to_string()));
        }
        if !space.contains(id) {
            return Err(Error::InvalidNode(format!(
                "id {} does not fit a {}-bit ring",
                id,
                space.bits()
            )));
        }
        Ok(Self { id, addr })
    }

    /// Construct node info whose id is the hash of its address.
    pub fn from_addr(space: &IdentifierSpace, addr: impl Into<NodeAddr>) -> Self {
        let addr = addr.into();
        let id = space.hash(addr.0.as_bytes());
        Self { id, addr }
    }
}

impl PartialEq for NodeInfo {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for NodeInfo {}

impl Hash for NodeInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for NodeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.addr)
    }
}
