//! Partitioner abstraction for the identifier ring.
//!
//! Partitioners turn opaque keys into 64-bit digests; the
//! [`IdentifierSpace`](crate::ring::IdentifierSpace) reduces those digests
//! onto the ring.

pub mod blake3;
pub mod sip;
pub mod traits;
pub mod xxh3;

pub use self::blake3::Blake3Partitioner;
pub use sip::SipPartitioner;
pub use traits::{Partitioner, PartitionerKind};
pub use xxh3::Xxh3Partitioner;
