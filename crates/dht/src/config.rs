//! Node configuration.

use crate::error::{DhtError, Result};
use corelib::ring::{DEFAULT_BITS, MAX_BITS};
use corelib::{IdentifierSpace, PartitionerKind};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for one ring node.
///
/// Every field has a default, so a partial JSON document is a valid
/// configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Identifier width; also the finger table length.
    pub bits: u8,
    /// Hash used to place keys (and address-derived node ids) on the ring.
    pub partitioner: PartitionerKind,
    /// Period of the stabilization task (default: 500 ms).
    #[serde(with = "millis")]
    pub stabilize_interval: Duration,
    /// Bound on every outbound call (default: 2 s).
    #[serde(with = "millis")]
    pub rpc_timeout: Duration,
    /// Finger entries refreshed per stabilization cycle.
    pub fingers_per_cycle: usize,
    /// Upper bound on hops for a single lookup.
    pub max_lookup_hops: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bits: DEFAULT_BITS,
            partitioner: PartitionerKind::default(),
            stabilize_interval: Duration::from_millis(500),
            rpc_timeout: Duration::from_secs(2),
            fingers_per_cycle: 1,
            max_lookup_hops: 256,
        }
    }
}

impl NodeConfig {
    /// Checks the configuration for values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.bits == 0 || self.bits > MAX_BITS {
            return Err(DhtError::Config(format!(
                "bits must be between 1 and {}, got {}",
                MAX_BITS, self.bits
            )));
        }
        if self.stabilize_interval.is_zero() {
            return Err(DhtError::Config("stabilize_interval must be non-zero".into()));
        }
        if self.rpc_timeout.is_zero() {
            return Err(DhtError::Config("rpc_timeout must be non-zero".into()));
        }
        if self.fingers_per_cycle == 0 {
            return Err(DhtError::Config("fingers_per_cycle must be at least 1".into()));
        }
        if self.max_lookup_hops == 0 {
            return Err(DhtError::Config("max_lookup_hops must be at least 1".into()));
        }
        Ok(())
    }

    /// Builds the identifier space this configuration describes.
    pub fn space(&self) -> Result<IdentifierSpace> {
        Ok(IdentifierSpace::with_partitioner(self.bits, self.partitioner)?)
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis().min(u128::from(u64::MAX)) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
