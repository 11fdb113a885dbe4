//! Chord ring node engine.
//!
//! This crate implements the protocol side of the ring:
//! - Finger-table routing and iterative successor lookup
//! - Successor/predecessor stabilization with the notify handshake
//! - Key range handoff when a new predecessor is accepted
//! - Logical-clock stamping of every exchange
//! - Pluggable transports (in-process and TCP)

pub mod client;
pub mod config;
pub mod error;
pub mod finger;
pub mod node;
pub mod pointers;
pub mod protocol;
pub mod stabilizer;
pub mod store;
pub mod transport;

pub use client::{NotifyOutcome, RpcClient};
pub use config::NodeConfig;
pub use error::{DhtError, Result};
pub use finger::FingerTable;
pub use node::Node;
pub use pointers::{Membership, RingPointers};
pub use protocol::{Envelope, NodeSnapshot, Reply, Request, Response, Status};
pub use stabilizer::Stabilizer;
pub use store::KeyValueStore;
pub use transport::{LocalNetwork, TcpTransport, Transport};
