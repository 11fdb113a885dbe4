//! Transport-agnostic delivery of envelopes between nodes.
//!
//! The engine only depends on [`Transport`]; [`LocalNetwork`] wires nodes
//! together in-process and [`TcpTransport`] speaks length-prefixed bincode
//! over TCP.

pub mod local;
pub mod tcp;

pub use local::LocalNetwork;
pub use tcp::{serve, TcpTransport};

use crate::protocol::{Envelope, Request, Response};
use async_trait::async_trait;
use corelib::NodeAddr;
use std::io;

/// Moves one request to a peer and brings back its response.
///
/// Any `Err` means the peer is unreachable. Timeouts are applied by the
/// caller, not the transport.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(&self, to: &NodeAddr, request: Envelope<Request>) -> io::Result<Envelope<Response>>;
}
