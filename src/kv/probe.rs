//! Shared probe-window primitives used by both ordinary operations and
//! migration: `find_bucket` (read path) and `acquire_empty_slot` +
//! `validate_insert` (write path). Kept in one place because the upsize
//! engine's `migrate_bucket` performs exactly the same claim/validate
//! dance `op_set` does when filling an empty slot in the destination
//! array, just without allocating a fresh record.

use std::sync::atomic::Ordering;

use super::data::Data;
use super::descriptor::{BucketSlot, Slot};
use super::hash::{bucket_index, LINEAR_SEARCH_RANGE};
use super::record::KeyValueRecord;

/// Outcome of scanning a probe window for a specific key.
pub enum FindResult {
    /// No matching, no-temporary-allowed bucket observed.
    Miss,
    /// A committed record matching the key.
    Hit { slot: &'static BucketSlot, transaction_id: u16, record: *mut KeyValueRecord },
    /// A `Temporary` claim matching the key (only returned when the caller
    /// asked to see temporaries).
    Claimed { slot: &'static BucketSlot, transaction_id: u16, record: *mut KeyValueRecord },
}

/// Scans the probe window for `hash`/`key`.
///
/// `data`'s lifetime is erased to `'static` here because every caller
/// holds the relevant epoch guard for at least as long as this function's
/// return value is used; see the `Hit`/`Claimed` variants' doc comments at
/// the call sites in `kv::table` for the exact guard each one relies on.
pub fn find_bucket(data: &Data, hash: u64, half: u32, key: &[u8], allow_temporary: bool) -> FindResult {
    let start = bucket_index(hash, data.buckets_count_mask);
    for offset in 0..LINEAR_SEARCH_RANGE {
        let idx = start + offset;
        if idx >= data.buckets_count_real {
            break;
        }
        let slot = data.bucket(idx);
        let view = slot.load(Ordering::Acquire);
        if view.hash_half != half {
            continue;
        }
        match view.slot {
            Slot::Tombstone | Slot::Migrated | Slot::Empty => continue,
            Slot::Temporary(ptr) => {
                if !allow_temporary {
                    continue;
                }
                let record = unsafe { &*ptr };
                if record.matches(hash, key) {
                    crate::debug_log!("probe: claimed hit at offset {offset} (half {half:#x})");
                    return FindResult::Claimed {
                        slot: unsafe { extend_lifetime(slot) },
                        transaction_id: view.transaction_id,
                        record: ptr,
                    };
                }
            }
            Slot::Occupied(ptr) => {
                let record = unsafe { &*ptr };
                if record.matches(hash, key) {
                    crate::debug_log!("probe: hit at offset {offset} (half {half:#x})");
                    return FindResult::Hit {
                        slot: unsafe { extend_lifetime(slot) },
                        transaction_id: view.transaction_id,
                        record: ptr,
                    };
                }
            }
        }
    }
    crate::debug_log!("probe: miss for half {half:#x} after {LINEAR_SEARCH_RANGE} slots");
    FindResult::Miss
}

/// Outcome of attempting to claim an empty or tombstoned slot.
pub enum AcquireResult {
    /// Claimed successfully; caller must validate next.
    Claimed { slot: &'static BucketSlot, transaction_id: u16 },
    /// The probe window was scanned with no usable slot.
    NeedsResizing,
}

/// Scans the probe window for the first reusable (empty or tombstoned)
/// slot and attempts to CAS-claim it with `record`.
pub fn acquire_empty_slot(data: &Data, hash: u64, half: u32, record: *mut KeyValueRecord) -> AcquireResult {
    let start = bucket_index(hash, data.buckets_count_mask);
    for offset in 0..LINEAR_SEARCH_RANGE {
        let idx = start + offset;
        if idx >= data.buckets_count_real {
            break;
        }
        let slot = data.bucket(idx);
        loop {
            let view = slot.load(Ordering::Acquire);
            if !matches!(view.slot, Slot::Empty | Slot::Tombstone) {
                break;
            }
            match slot.try_claim(record, half) {
                Some(transaction_id) => {
                    crate::debug_log!("probe: claimed offset {offset} (half {half:#x}, tid {transaction_id})");
                    return AcquireResult::Claimed { slot: unsafe { extend_lifetime(slot) }, transaction_id }
                }
                None => continue,
            }
        }
    }
    crate::debug_log!("probe: window exhausted acquiring slot for half {half:#x}");
    AcquireResult::NeedsResizing
}

/// Re-scans the window up to (excluding) `claimed_index` looking for a
/// competing claim or commit of the same key.
pub fn validate_insert(data: &Data, hash: u64, half: u32, key: &[u8], claimed_index: u64) -> bool {
    let start = bucket_index(hash, data.buckets_count_mask);
    for offset in 0..LINEAR_SEARCH_RANGE {
        let idx = start + offset;
        if idx >= claimed_index {
            break;
        }
        let slot = data.bucket(idx);
        let view = slot.load(Ordering::Acquire);
        if view.hash_half != half {
            continue;
        }
        let maybe_ptr = match view.slot {
            Slot::Occupied(ptr) | Slot::Temporary(ptr) => Some(ptr),
            _ => None,
        };
        if let Some(ptr) = maybe_ptr {
            let record = unsafe { &*ptr };
            if record.matches(hash, key) {
                return false;
            }
        }
    }
    true
}

/// Index of a bucket slot reference within `data`, needed by
/// `validate_insert`'s exclusive upper bound. Computed from pointer
/// arithmetic since `Data` doesn't expose bucket indices directly.
pub fn slot_index(data: &Data, slot: &BucketSlot) -> u64 {
    let base = data.bucket(0) as *const BucketSlot as usize;
    let this = slot as *const BucketSlot as usize;
    ((this - base) / std::mem::size_of::<BucketSlot>()) as u64
}

/// Erases the borrow on `data` carried by a `&BucketSlot`. Safe in context:
/// every caller holds a data-domain epoch guard for at least as long as
/// the returned reference is used, which is what actually keeps `data`
/// alive, not the borrow checker.
unsafe fn extend_lifetime(slot: &BucketSlot) -> &'static BucketSlot {
    &*(slot as *const BucketSlot)
}
