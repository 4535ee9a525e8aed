//! Key hashing for the map trie.
//!
//! Keys are hashed once with a function whose identity is recorded in the
//! file header. Stored hashes are never recomputed, so the function for a
//! given version id must never change.
//!
//! The trie consumes the hash `log2(B)` bits at a time starting from the
//! least significant bits. With B = 32 that is 13 levels: twelve 5-bit groups
//! and a final 4-bit group.

use xxhash_rust::xxh3::xxh3_64;

use crate::config::{HASH_BITS, HASH_VERSION_XXH3};

/// Hash function selected by a header's `hash_version`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyHasher {
    version: u16,
}

impl KeyHasher {
    /// Returns the hasher for `version`, or `None` if this build does not
    /// know it.
    pub fn for_version(version: u16) -> Option<Self> {
        (version == HASH_VERSION_XXH3).then_some(Self { version })
    }

    pub fn version(&self) -> u16 {
        self.version
    }

    #[inline]
    pub fn hash(&self, key: &[u8]) -> u64 {
        xxh3_64(key)
    }
}

/// Slot index of `hash` at trie `depth` for a fan-out of `1 << bits`.
///
/// Returns `None` once every bit of the hash has been consumed.
#[inline]
pub fn slot_index(hash: u64, depth: u32, bits: u32) -> Option<usize> {
    let shift = depth.checked_mul(bits)?;
    if shift >= HASH_BITS {
        return None;
    }
    let mask = (1u64 << bits) - 1;
    Some(((hash >> shift) & mask) as usize)
}

/// Number of trie levels needed to consume a full hash.
pub fn max_depth(bits: u32) -> u32 {
    HASH_BITS.div_ceil(bits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable() {
        let hasher = KeyHasher::for_version(HASH_VERSION_XXH3).unwrap();

        assert_eq!(hasher.hash(b"alpha"), hasher.hash(b"alpha"));
        assert_ne!(hasher.hash(b"alpha"), hasher.hash(b"beta"));
        assert_eq!(hasher.hash(b""), xxh3_64(b""));
    }

    #[test]
    fn unknown_version_has_no_hasher() {
        assert!(KeyHasher::for_version(0).is_none());
        assert!(KeyHasher::for_version(2).is_none());
    }

    #[test]
    fn slot_index_walks_bit_groups() {
        let hash = 0b10110_00011_11111u64;

        assert_eq!(slot_index(hash, 0, 5), Some(0b11111));
        assert_eq!(slot_index(hash, 1, 5), Some(0b00011));
        assert_eq!(slot_index(hash, 2, 5), Some(0b10110));
    }

    #[test]
    fn last_group_is_partial_and_then_exhausted() {
        let hash = u64::MAX;

        assert_eq!(max_depth(5), 13);
        assert_eq!(slot_index(hash, 12, 5), Some(0b1111));
        assert_eq!(slot_index(hash, 13, 5), None);
        assert_eq!(max_depth(4), 16);
        assert_eq!(slot_index(hash, 16, 4), None);
    }
}
