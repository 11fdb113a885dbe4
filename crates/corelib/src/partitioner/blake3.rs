//! BLAKE3 partitioner implementation.

use crate::partitioner::traits::Partitioner;

/// Partitioner backed by the BLAKE3 cryptographic hash.
///
/// Default choice: a cryptographic digest keeps node and key placement
/// uniform even for adversarially chosen names.
#[derive(Clone, Debug, Default)]
pub struct Blake3Partitioner;

impl Partitioner for Blake3Partitioner {
    fn digest(&self, key: &[u8]) -> u64 {
        let hash = blake3::hash(key);
        let mut word = [0u8; 8];
        word.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_be_bytes(word)
    }

    fn name(&self) -> &'static str {
        "Blake3Partitioner"
    }
}
