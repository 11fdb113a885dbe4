//! Modular arithmetic over an M-bit identifier ring.

use crate::error::{Error, Result};
use crate::id::Id;
use crate::partitioner::{Partitioner, PartitionerKind};
use crate::ring::MAX_BITS;
use std::sync::Arc;

/// An M-bit circular identifier space together with the partitioner used to
/// hash keys onto it.
///
/// Cheap to clone: the partitioner is shared behind an `Arc`.
#[derive(Clone, Debug)]
pub struct IdentifierSpace {
    bits: u8,
    mask: u64,
    partitioner: Arc<dyn Partitioner>,
}

impl IdentifierSpace {
    /// Creates a space of `bits` width hashed with the default partitioner.
    pub fn new(bits: u8) -> Result<Self> {
        Self::with_partitioner(bits, PartitionerKind::default())
    }

    /// Creates a space hashed with the named partitioner.
    pub fn with_partitioner(bits: u8, kind: PartitionerKind) -> Result<Self> {
        Self::with_custom_partitioner(bits, kind.build())
    }

    /// Creates a space hashed with an arbitrary partitioner.
    pub fn with_custom_partitioner(bits: u8, partitioner: Arc<dyn Partitioner>) -> Result<Self> {
        if bits == 0 || bits > MAX_BITS {
            return Err(Error::InvalidSpace(format!(
                "identifier width must be between 1 and {} bits, got {}",
                MAX_BITS, bits
            )));
        }
        let mask = if bits == MAX_BITS {
            u64::MAX
        } else {
            (1u64 << bits) - 1
        };
        Ok(Self {
            bits,
            mask,
            partitioner,
        })
    }

    /// Width of the ring in bits; also the finger table length.
    #[inline]
    pub fn bits(&self) -> u8 {
        self.bits
    }

    /// Number of distinct identifiers (`2^bits`).
    #[inline]
    pub fn size(&self) -> u128 {
        1u128 << self.bits
    }

    /// Name of the partitioner hashing keys onto this ring.
    pub fn partitioner_name(&self) -> &'static str {
        self.partitioner.name()
    }

    /// True if `id` is a legal position on this ring.
    #[inline]
    pub fn contains(&self, id: Id) -> bool {
        id.0 & !self.mask == 0
    }

    /// Validates a raw value as an identifier of this ring.
    pub fn id(&self, value: u64) -> Result<Id> {
        let id = Id(value);
        if self.contains(id) {
            Ok(id)
        } else {
            Err(Error::InvalidIdentifier(format!(
                "{} does not fit a {}-bit ring",
                value, self.bits
            )))
        }
    }

    /// Reduces an arbitrary value onto the ring.
    #[inline]
    pub fn wrap(&self, value: u64) -> Id {
        Id(value & self.mask)
    }

    /// Hashes an opaque key onto the ring.
    pub fn hash(&self, key: &[u8]) -> Id {
        self.wrap(self.partitioner.digest(key))
    }

    /// Hashes a string key onto the ring.
    pub fn hash_key(&self, key: &str) -> Id {
        self.hash(key.as_bytes())
    }

    /// Clockwise distance from `from` to `to`.
    #[inline]
    pub fn distance(&self, from: Id, to: Id) -> u64 {
        to.0.wrapping_sub(from.0) & self.mask
    }

    /// True iff `x` lies strictly inside the clockwise arc from `a` to `b`.
    ///
    /// `a == b` denotes the whole ring except `a` itself.
    pub fn between(&self, a: Id, x: Id, b: Id) -> bool {
        if a == b {
            return x != a;
        }
        let dx = self.distance(a, x);
        dx > 0 && dx < self.distance(a, b)
    }

    /// True iff `x` lies in the clockwise arc `(a, b]`.
    ///
    /// `a == b` denotes the whole ring: a lone node owns every key.
    pub fn in_half_open(&self, a: Id, x: Id, b: Id) -> bool {
        if a == b {
            return true;
        }
        let dx = self.distance(a, x);
        dx > 0 && dx <= self.distance(a, b)
    }

    /// Start of finger `i` for node `n`: `(n + 2^i) mod 2^bits`.
    ///
    /// `i` must be below [`bits`](Self::bits).
    pub fn finger_start(&self, n: Id, i: u8) -> Id {
        debug_assert!(i < self.bits);
        self.wrap(n.0.wrapping_add(1u64 << i))
    }
}
