//! SipHash partitioner implementation.

use crate::partitioner::traits::Partitioner;
use siphasher::sip::SipHasher13;
use std::hash::{Hash, Hasher};

/// SipHash-1-3 partitioner with the zero key.
#[derive(Clone, Debug, Default)]
pub struct SipPartitioner;

impl Partitioner for SipPartitioner {
    fn digest(&self, key: &[u8]) -> u64 {
        let mut hasher = SipHasher13::new();
        key.hash(&mut hasher);
        hasher.finish()
    }

    fn name(&self) -> &'static str {
        "SipPartitioner"
    }
}
