//! Core library for the Chord ring.
//!
//! This crate provides the pure building blocks the ring protocol is built on:
//! - Ring identifiers and the modular identifier space
//! - Partitioner algorithms hashing keys onto the ring
//! - Node identity and addressing
//! - The Lamport logical clock
//! - Key/value batches exchanged during handoff

pub mod clock;
pub mod error;
pub mod id;
pub mod node;
pub mod partitioner;
pub mod ring;
pub mod table;

pub use clock::LogicalClock;
pub use error::{Error, Result};
pub use id::Id;
pub use node::{NodeAddr, NodeInfo};
pub use partitioner::{Partitioner, PartitionerKind};
pub use ring::IdentifierSpace;
pub use table::{TableRep, TableRow};
