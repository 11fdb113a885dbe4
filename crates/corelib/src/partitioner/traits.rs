//! Core partitioner trait definitions.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;

use super::{Blake3Partitioner, SipPartitioner, Xxh3Partitioner};

/// A partitioner converts keys into digests for placement on the ring.
///
/// Partitioners are stateless and thread-safe, allowing concurrent
/// hashing without synchronization overhead.
pub trait Partitioner: Send + Sync + Debug + 'static {
    /// Hashes a key into a 64-bit digest.
    ///
    /// Only the low bits survive once the digest is reduced onto a ring
    /// narrower than 64 bits, so implementations must mix well across the
    /// whole word.
    fn digest(&self, key: &[u8]) -> u64;

    /// Returns the name of this partitioner.
    fn name(&self) -> &'static str;
}

/// Configurable choice of partitioner.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionerKind {
    #[default]
    Blake3,
    Xxh3,
    Sip,
}

impl PartitionerKind {
    /// Instantiates the partitioner this kind names.
    pub fn build(self) -> Arc<dyn Partitioner> {
        match self {
            PartitionerKind::Blake3 => Arc::new(Blake3Partitioner),
            PartitionerKind::Xxh3 => Arc::new(Xxh3Partitioner),
            PartitionerKind::Sip => Arc::new(SipPartitioner),
        }
    }
}

impl std::str::FromStr for PartitionerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "blake3" => Ok(PartitionerKind::Blake3),
            "xxh3" => Ok(PartitionerKind::Xxh3),
            "sip" => Ok(PartitionerKind::Sip),
            other => Err(format!("unknown partitioner `{}`", other)),
        }
    }
}
