//! Hash folding, bucket index derivation, and the linear-probe window.

use ahash::AHasher;
use std::hash::Hasher;

/// Number of consecutive slots scanned by linear probing past a bucket's
/// preferred index. Sized to cover a handful of cache-line neighborhoods
/// without growing the probe-window overflow buffer unreasonably.
pub const LINEAR_SEARCH_RANGE: u64 = 16;

/// Folds a byte-string key into a 64-bit hash.
pub fn hash64(key: &[u8]) -> u64 {
    let mut hasher = AHasher::default();
    hasher.write(key);
    hasher.finish()
}

/// Derives the 32-bit half-hash stored in a bucket descriptor's fast
/// pre-filter: the upper 32 bits of the full hash, with the high bit
/// forced on so that `0` unambiguously means "slot never occupied".
pub fn half_hash(hash: u64) -> u32 {
    ((hash >> 32) as u32) | 0x8000_0000
}

/// Maps a full hash onto a bucket index within `[0, buckets_count)`.
pub fn bucket_index(hash: u64, buckets_count_mask: u64) -> u64 {
    (hash >> 32) & buckets_count_mask
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_hash_high_bit_always_set() {
        assert_eq!(half_hash(0) & 0x8000_0000, 0x8000_0000);
        assert_eq!(half_hash(u64::MAX) & 0x8000_0000, 0x8000_0000);
    }

    #[test]
    fn half_hash_never_zero() {
        for h in [0u64, 1, u64::MAX, 0xFFFF_FFFF_0000_0000] {
            assert_ne!(half_hash(h), 0);
        }
    }

    #[test]
    fn hash64_is_deterministic() {
        assert_eq!(hash64(b"hello"), hash64(b"hello"));
        assert_ne!(hash64(b"hello"), hash64(b"world"));
    }
}
