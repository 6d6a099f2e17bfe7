//! The bucket array for one table generation.

use super::descriptor::BucketSlot;
use super::hash::LINEAR_SEARCH_RANGE;

/// A fixed-size array of bucket descriptors backing one generation of the
/// table. A table holds at most two of these alive at once: the current
/// array and, while `UPSIZING`, the one being migrated out of.
pub struct Data {
    /// Power-of-two logical bucket count.
    pub buckets_count: u64,
    /// `buckets_count - 1`, used to mask a bucket index out of a hash.
    pub buckets_count_mask: u64,
    /// `buckets_count + LINEAR_SEARCH_RANGE`: the physical array length,
    /// padded so a probe window starting near the end never wraps.
    pub buckets_count_real: u64,
    buckets: Box<[BucketSlot]>,
}

impl Data {
    /// Allocates a zeroed (all-empty) bucket array for `buckets_count`
    /// logical slots. `buckets_count` must already be a validated power of
    /// two; this is enforced by `TableConfig::validate` and by the
    /// doubling performed in `upsize_prepare`.
    pub fn with_capacity(buckets_count: u64) -> Self {
        debug_assert!(buckets_count.is_power_of_two());
        let buckets_count_real = buckets_count + LINEAR_SEARCH_RANGE;
        let mut buckets = Vec::with_capacity(buckets_count_real as usize);
        buckets.resize_with(buckets_count_real as usize, BucketSlot::default);
        Data {
            buckets_count,
            buckets_count_mask: buckets_count - 1,
            buckets_count_real,
            buckets: buckets.into_boxed_slice(),
        }
    }

    /// Borrows the bucket slot at `index`, which must be `< buckets_count_real`.
    pub fn bucket(&self, index: u64) -> &BucketSlot {
        &self.buckets[index as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn physical_length_includes_probe_overflow() {
        let data = Data::with_capacity(16);
        assert_eq!(data.buckets_count, 16);
        assert_eq!(data.buckets_count_mask, 15);
        assert_eq!(data.buckets_count_real, 16 + LINEAR_SEARCH_RANGE);
    }

    #[test]
    fn every_bucket_starts_empty() {
        let data = Data::with_capacity(16);
        for i in 0..data.buckets_count_real {
            let view = data.bucket(i).load(std::sync::atomic::Ordering::Acquire);
            assert!(matches!(view.slot, super::super::descriptor::Slot::Empty));
        }
    }
}
