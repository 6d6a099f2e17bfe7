//! Epoch-based reclamation, split into two independent domains.
//!
//! Key-value records and `Data` arrays are retired through separate
//! `crossbeam_epoch` collectors. Mixing them into one domain would make
//! every record retirement wait behind the much rarer, much larger `Data`
//! retirements (and vice versa) — the two have very different lifetimes,
//! so each gets its own collector.

use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_epoch::{Collector, Guard, LocalHandle};
use crossbeam_utils::CachePadded;

use super::data::Data;
use super::record::KeyValueRecord;

/// Owns the two GC domains and the sharded counters `op_size` reads.
///
/// The size counters live here, not on `Table`, because they are really
/// part of the same "per-thread bookkeeping" story as thread attachment:
/// each registered thread gets one shard to bump without contending with
/// any other thread's increments.
pub struct GcDomains {
    key_value: Collector,
    data: Collector,
    next_shard: AtomicUsize,
    size_shards: Box<[CachePadded<std::sync::atomic::AtomicI64>]>,
}

impl GcDomains {
    pub fn new(shard_count: usize) -> Self {
        let shard_count = shard_count.max(1);
        let size_shards = (0..shard_count)
            .map(|_| CachePadded::new(std::sync::atomic::AtomicI64::new(0)))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        GcDomains {
            key_value: Collector::new(),
            data: Collector::new(),
            next_shard: AtomicUsize::new(0),
            size_shards,
        }
    }

    /// Registers a new thread with both GC domains, assigning it a size
    /// counter shard round-robin.
    pub fn register(&self) -> ThreadAttachment {
        let shard = self.next_shard.fetch_add(1, Ordering::Relaxed) % self.size_shards.len();
        ThreadAttachment {
            key_value: self.key_value.register(),
            data: self.data.register(),
            size_shard: shard,
        }
    }

    /// Sums the per-shard counters. Approximate under concurrent mutation
    /// (some increments/decrements may be mid-flight) — per-thread counters
    /// summed on demand, traded off against a single hot contended counter
    /// or a full table scan.
    pub fn size(&self) -> i64 {
        self.size_shards.iter().map(|c| c.load(Ordering::Relaxed)).sum()
    }

    fn bump_size(&self, attachment: &ThreadAttachment, delta: i64) {
        self.size_shards[attachment.size_shard].fetch_add(delta, Ordering::Relaxed);
    }

    /// Records one committed insert.
    pub fn record_insert(&self, attachment: &ThreadAttachment) {
        self.bump_size(attachment, 1);
    }

    /// Records one committed delete.
    pub fn record_delete(&self, attachment: &ThreadAttachment) {
        self.bump_size(attachment, -1);
    }

    /// Retires a key-value record: frees it once every thread's key-value
    /// epoch has advanced past this point.
    ///
    /// # Safety
    /// `ptr` must be a live pointer from [`KeyValueRecord::alloc`] that no
    /// other thread will retire again.
    pub unsafe fn retire_record(&self, guard: &Guard, ptr: *mut KeyValueRecord) {
        guard.defer_unchecked(move || KeyValueRecord::reclaim(ptr));
    }

    /// Retires a `Data` array: frees it once every thread's data epoch has
    /// advanced past this point.
    ///
    /// # Safety
    /// `ptr` must be a live `Box::into_raw(Box<Data>)` that no other
    /// thread will retire again.
    pub unsafe fn retire_data(&self, guard: &Guard, ptr: *mut Data) {
        guard.defer_unchecked(move || drop(Box::from_raw(ptr)));
    }
}

/// A thread's registration with both GC domains plus its size-counter
/// shard. Callers obtain one via [`crate::kv::Table::thread_register`] and
/// pass it by reference to every operation; there is no implicit
/// thread-local lookup, unlike the C original this crate's protocol is
/// derived from.
pub struct ThreadAttachment {
    key_value: LocalHandle,
    data: LocalHandle,
    size_shard: usize,
}

impl ThreadAttachment {
    /// Pins this thread's key-value epoch for the duration of the guard,
    /// protecting any record pointer dereferenced while it's held.
    pub fn pin_key_value(&self) -> Guard {
        self.key_value.pin()
    }

    /// Pins this thread's data epoch for the duration of the guard,
    /// protecting the current (and, mid-upsize, the previous) `Data` array
    /// pointer dereferenced while it's held.
    pub fn pin_data(&self) -> Guard {
        self.data.pin()
    }
}
