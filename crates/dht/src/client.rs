//! Typed client for the peer operations.
//!
//! Wraps a [`Transport`] with the logical clock discipline, a timeout on every
//! call, and the status-to-error mapping: unreachable peers become
//! [`DhtError::Unreachable`], failure statuses become [`DhtError::Failed`],
//! and a `NotModified` answer to `notify` becomes [`NotifyOutcome::Rejected`].

use crate::error::{DhtError, Result};
use crate::protocol::{Envelope, NodeSnapshot, Reply, Request, Response, Status};
use crate::transport::Transport;
use corelib::{Id, LogicalClock, NodeAddr, NodeInfo, TableRep};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Result of introducing ourselves to a would-be successor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// We are its predecessor now; here are the keys we own.
    Accepted(TableRep),
    /// Someone closer got there first. Benign, not a failure.
    Rejected,
}

#[derive(Clone)]
pub struct RpcClient {
    transport: Arc<dyn Transport>,
    clock: Arc<LogicalClock>,
    timeout: Duration,
}

impl RpcClient {
    pub fn new(transport: Arc<dyn Transport>, clock: Arc<LogicalClock>, timeout: Duration) -> Self {
        Self {
            transport,
            clock,
            timeout,
        }
    }

    pub fn clock(&self) -> &Arc<LogicalClock> {
        &self.clock
    }

    async fn call(&self, op: &'static str, to: &NodeAddr, request: Request) -> Result<Response> {
        let time = self.clock.advance(None);
        debug!(peer = %to, op, time, "client request");
        let sent = tokio::time::timeout(self.timeout, self.transport.send(to, Envelope::new(time, request))).await;
        let envelope = match sent {
            Ok(Ok(envelope)) => envelope,
            Ok(Err(e)) => {
                warn!(peer = %to, op, error = %e, "peer unreachable");
                return Err(DhtError::Unreachable {
                    op,
                    addr: to.clone(),
                });
            }
            Err(_) => {
                warn!(peer = %to, op, timeout_ms = self.timeout.as_millis() as u64, "request timed out");
                return Err(DhtError::Unreachable {
                    op,
                    addr: to.clone(),
                });
            }
        };
        self.clock.advance(Some(envelope.time));
        Ok(envelope.body)
    }

    /// Sends `request` and insists on an `Ok` status.
    async fn call_ok(&self, op: &'static str, to: &NodeAddr, request: Request) -> Result<Reply> {
        let response = self.call(op, to, request).await?;
        match response.status {
            Status::Ok => Ok(response.reply),
            Status::NotOwner => {
                debug!(peer = %to, op, "peer does not own the key");
                Err(DhtError::NotOwner(to.clone()))
            }
            status => {
                warn!(peer = %to, op, ?status, "remote operation failed");
                Err(DhtError::Failed(op.to_string()))
            }
        }
    }

    /// Liveness probe: true if `addr` cannot be reached or answers with a
    /// failure.
    pub async fn is_failed(&self, addr: &NodeAddr) -> bool {
        match self.call("info", addr, Request::Info).await {
            Ok(response) => response.status != Status::Ok,
            Err(_) => true,
        }
    }

    pub async fn info(&self, addr: &NodeAddr) -> Result<NodeSnapshot> {
        match self.call_ok("info", addr, Request::Info).await? {
            Reply::Info(snapshot) => Ok(snapshot),
            _ => Err(DhtError::Failed("info".into())),
        }
    }

    pub async fn get_pred(&self, node: &NodeInfo) -> Result<Option<NodeInfo>> {
        match self.call_ok("pred", &node.addr, Request::Pred).await? {
            Reply::MaybeNode(pred) => Ok(pred),
            _ => Err(DhtError::Failed("pred".into())),
        }
    }

    pub async fn get_succ(&self, node: &NodeInfo) -> Result<NodeInfo> {
        match self.call_ok("succ", &node.addr, Request::Succ).await? {
            Reply::Node(succ) => Ok(succ),
            _ => Err(DhtError::Failed("succ".into())),
        }
    }

    pub async fn closest_preceding_finger(&self, node: &NodeInfo, id: Id) -> Result<NodeInfo> {
        match self.call_ok("finger", &node.addr, Request::Finger { id }).await? {
            Reply::Node(finger) => Ok(finger),
            _ => Err(DhtError::Failed("finger".into())),
        }
    }

    /// Asks the node at `addr` to resolve the successor of `id`.
    pub async fn find_successor(&self, addr: &NodeAddr, id: Id) -> Result<NodeInfo> {
        match self.call_ok("find", addr, Request::Find { id }).await? {
            Reply::Node(succ) => Ok(succ),
            _ => Err(DhtError::Failed("find".into())),
        }
    }

    /// Tells `node` that we (think we) are its predecessor.
    ///
    /// `pred_db` carries our identity; the entries are ignored by the callee.
    pub async fn notify(&self, node: &NodeInfo, pred_db: TableRep) -> Result<NotifyOutcome> {
        let response = self.call("notify", &node.addr, Request::Notify(pred_db)).await?;
        match (response.status, response.reply) {
            (Status::NotModified, _) => Ok(NotifyOutcome::Rejected),
            (Status::Ok, Reply::Table(bindings)) => Ok(NotifyOutcome::Accepted(bindings)),
            (status, _) => {
                warn!(peer = %node.addr, ?status, "notify failed");
                Err(DhtError::Failed("notify".into()))
            }
        }
    }

    /// Values bound to `key` in `node`'s local store.
    pub async fn get(&self, node: &NodeInfo, key: &str) -> Result<Vec<String>> {
        let request = Request::Get { key: key.to_string() };
        match self.call_ok("get", &node.addr, request).await? {
            Reply::Values(vals) => Ok(vals),
            _ => Err(DhtError::Failed("get".into())),
        }
    }

    pub async fn add(&self, node: &NodeInfo, key: &str, val: &str) -> Result<()> {
        let request = Request::Add {
            key: key.to_string(),
            val: val.to_string(),
        };
        self.call_ok("add", &node.addr, request).await.map(|_| ())
    }

    pub async fn delete(&self, node: &NodeInfo, key: &str, val: &str) -> Result<()> {
        let request = Request::Delete {
            key: key.to_string(),
            val: val.to_string(),
        };
        self.call_ok("delete", &node.addr, request).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::io;

    /// Answers every request with a fixed response and clock value.
    struct Canned {
        response: Response,
        time: u64,
    }

    #[async_trait]
    impl Transport for Canned {
        async fn send(&self, _to: &NodeAddr, _request: Envelope<Request>) -> io::Result<Envelope<Response>> {
            Ok(Envelope::new(self.time, self.response.clone()))
        }
    }

    struct Down;

    #[async_trait]
    impl Transport for Down {
        async fn send(&self, to: &NodeAddr, _request: Envelope<Request>) -> io::Result<Envelope<Response>> {
            Err(io::Error::new(io::ErrorKind::ConnectionRefused, to.to_string()))
        }
    }

    struct Silent;

    #[async_trait]
    impl Transport for Silent {
        async fn send(&self, _to: &NodeAddr, _request: Envelope<Request>) -> io::Result<Envelope<Response>> {
            std::future::pending().await
        }
    }

    fn client(transport: impl Transport) -> RpcClient {
        RpcClient::new(Arc::new(transport), Arc::new(LogicalClock::new()), Duration::from_millis(50))
    }

    fn peer() -> NodeInfo {
        NodeInfo::new(Id(4), "n4")
    }

    #[tokio::test]
    async fn test_not_modified_is_benign_rejection() {
        let c = client(Canned {
            response: Response::not_modified(),
            time: 1,
        });
        let outcome = c.notify(&peer(), TableRep::new(NodeInfo::new(Id(1), "n1"))).await.unwrap();
        assert_eq!(outcome, NotifyOutcome::Rejected);
    }

    #[tokio::test]
    async fn test_failure_status_is_named_failure() {
        let c = client(Canned {
            response: Response::internal("boom"),
            time: 1,
        });
        let err = c.get_succ(&peer()).await.unwrap_err();
        assert!(matches!(err, DhtError::Failed(ref op) if op == "succ"));
        assert!(c.is_failed(&peer().addr).await);
    }

    #[tokio::test]
    async fn test_not_modified_outside_notify_is_failure() {
        let c = client(Canned {
            response: Response::not_modified(),
            time: 1,
        });
        assert!(matches!(c.get_pred(&peer()).await, Err(DhtError::Failed(_))));
    }

    #[tokio::test]
    async fn test_not_owner_is_distinct_from_failure() {
        let c = client(Canned {
            response: Response::not_owner(),
            time: 1,
        });
        let err = c.delete(&peer(), "k", "v").await.unwrap_err();
        assert!(matches!(err, DhtError::NotOwner(ref addr) if *addr == peer().addr));
        assert!(matches!(err.into_failed("delete"), DhtError::Failed(ref op) if op == "delete"));
    }

    #[tokio::test]
    async fn test_unreachable_and_timeout() {
        let down = client(Down);
        assert!(down.get_succ(&peer()).await.unwrap_err().is_unreachable());
        assert!(down.is_failed(&peer().addr).await);

        let silent = client(Silent);
        assert!(silent.get_pred(&peer()).await.unwrap_err().is_unreachable());
    }

    #[tokio::test]
    async fn test_clock_folds_in_peer_time() {
        let c = client(Canned {
            response: Response::ok(Reply::Values(vec![])),
            time: 41,
        });
        assert!(c.get(&peer(), "k").await.unwrap().is_empty());
        // Sent at 1, received 41 -> max(1, 41) + 1.
        assert_eq!(c.clock().now(), 42);
    }
}
