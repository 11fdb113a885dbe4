//! In-process network of nodes.

use super::Transport;
use crate::node::Node;
use crate::protocol::{Envelope, Request, Response};
use async_trait::async_trait;
use corelib::NodeAddr;
use dashmap::{DashMap, DashSet};
use std::io;
use std::sync::{Arc, Weak};
use tracing::debug;

/// Routes envelopes straight into registered nodes' handlers.
///
/// Holds nodes weakly: dropping the last `Arc<Node>` takes the node off the
/// network just like a crash would. `fail`/`heal` simulate a partition
/// without dropping state.
#[derive(Debug, Default)]
pub struct LocalNetwork {
    nodes: DashMap<NodeAddr, Weak<Node>>,
    failed: DashSet<NodeAddr>,
}

impl LocalNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, node: &Arc<Node>) {
        self.nodes
            .insert(node.info().addr.clone(), Arc::downgrade(node));
    }

    pub fn unregister(&self, addr: &NodeAddr) {
        self.nodes.remove(addr);
    }

    /// Makes `addr` unreachable until [`heal`](Self::heal) is called.
    pub fn fail(&self, addr: &NodeAddr) {
        debug!(peer = %addr, "local network: failing node");
        self.failed.insert(addr.clone());
    }

    pub fn heal(&self, addr: &NodeAddr) {
        self.failed.remove(addr);
    }

    pub fn is_reachable(&self, addr: &NodeAddr) -> bool {
        !self.failed.contains(addr) && self.lookup(addr).is_some()
    }

    fn lookup(&self, addr: &NodeAddr) -> Option<Arc<Node>> {
        // Clone out of the map so no shard guard lives across an await.
        self.nodes.get(addr).and_then(|entry| entry.value().upgrade())
    }
}

#[async_trait]
impl Transport for LocalNetwork {
    async fn send(&self, to: &NodeAddr, request: Envelope<Request>) -> io::Result<Envelope<Response>> {
        if self.failed.contains(to) {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("{} is failed", to),
            ));
        }
        let node = self.lookup(to).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no node at {}", to))
        })?;
        Ok(node.handle(request).await)
    }
}
