//! The table itself: `op_get` / `op_set` / `op_delete`, thread
//! registration, and the public surface `upsize_prepare` /
//! `upsize_migrate_block` wrap for callers that want to drive resizing
//! explicitly rather than rely on opportunistic migration.

use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use tracing::{error, info, trace};

use crate::core::config::TableConfig;
use crate::error::{Error, Result};

use super::data::Data;
use super::descriptor::Slot;
use super::gc::{GcDomains, ThreadAttachment};
use super::hash::{bucket_index, half_hash, hash64, LINEAR_SEARCH_RANGE};
use super::probe::{acquire_empty_slot, find_bucket, slot_index, validate_insert, AcquireResult, FindResult};
use super::record::KeyValueRecord;
use super::upsize::UpsizeState;

/// Number of times `op_set`/`op_delete` retry a lost CAS race (a
/// competing writer touched the same bucket) before giving up and telling
/// the caller to retry later. Contention this deep on a single key is
/// exceptional; the bound is an implementation choice, not a protocol
/// constant.
const MAX_OP_RETRIES: u32 = 16;

/// Outcome of [`Table::op_get`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GetResult {
    /// The key was found; carries its current value.
    Found(u64),
    /// The key is not present.
    NotFound,
}

/// Outcome of [`Table::op_set`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetResult {
    /// Committed. `created_new` distinguishes a fresh insert from an
    /// update; `previous_value` is `0` for a fresh insert.
    Ok { created_new: bool, previous_value: u64 },
    /// The probe window was exhausted; the caller should call
    /// [`Table::upsize_prepare`] and retry.
    NeedsResizing,
    /// Transient contention; retry the call.
    TryLater,
    /// The table has already reached `max_buckets` and the key's probe
    /// window is fully occupied. Fatal per spec.md §7: `upsize_prepare`
    /// at this cap always returns `false` (see `UpsizeState::prepare`), so
    /// unlike `NeedsResizing` there is no retry that can ever succeed.
    Full,
}

/// Outcome of [`Table::op_delete`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteResult {
    /// The key was present and is now tombstoned.
    Deleted,
    /// The key was not present.
    NotFound,
    /// Transient contention; retry the call.
    TryLater,
}

/// The concurrent hash table.
pub struct Table {
    data: AtomicPtr<Data>,
    upsize: UpsizeState,
    gc: GcDomains,
    config: TableConfig,
}

impl Table {
    /// Allocates a fresh table with its initial bucket array and GC domains.
    pub fn new(config: TableConfig) -> Result<Self> {
        let config = config.validate()?;
        let data = Box::into_raw(Box::new(Data::with_capacity(config.initial_buckets)));
        info!(initial_buckets = config.initial_buckets, max_buckets = config.max_buckets, "table initialised");
        Ok(Table {
            data: AtomicPtr::new(data),
            upsize: UpsizeState::default(),
            gc: GcDomains::new(num_cpus_hint()),
            config,
        })
    }

    /// Registers a new thread with both GC domains. Must be called once
    /// per thread before that thread calls any other method.
    pub fn thread_register(&self) -> ThreadAttachment {
        self.gc.register()
    }

    /// Approximate number of live (committed, non-deleted) keys, derived
    /// from per-thread counters rather than a table scan.
    pub fn op_size(&self) -> u64 {
        self.gc.size().max(0) as u64
    }

    /// Reads the value for `key`, consulting the old array too while an
    /// upsize is in flight and the key isn't (yet) in the current one.
    pub fn op_get(&self, attachment: &ThreadAttachment, key: &[u8]) -> GetResult {
        let guard = attachment.pin_key_value();
        let data_guard = attachment.pin_data();
        let hash = hash64(key);
        let half = half_hash(hash);

        crate::debug_log!("op_get: key of {} bytes, hash {hash:#x}", key.len());

        let current_ptr = self.data.load(Ordering::Acquire);
        let current = unsafe { &*current_ptr };
        if let FindResult::Hit { record, .. } = find_bucket(current, hash, half, key, false) {
            let value = unsafe { (*record).value() };
            drop(guard);
            drop(data_guard);
            self.maybe_assist_migration(attachment);
            return GetResult::Found(value);
        }

        if self.upsize.is_upsizing() {
            let from_ptr = self.upsize.from_ptr();
            if !from_ptr.is_null() {
                let from = unsafe { &*from_ptr };
                if let FindResult::Hit { record, .. } = find_bucket(from, hash, half, key, false) {
                    let value = unsafe { (*record).value() };
                    drop(guard);
                    drop(data_guard);
                    self.maybe_assist_migration(attachment);
                    return GetResult::Found(value);
                }
            }
        }

        drop(guard);
        drop(data_guard);
        self.maybe_assist_migration(attachment);
        GetResult::NotFound
    }

    /// Inserts or updates `key -> value`, returning the previous value on
    /// update.
    pub fn op_set(&self, attachment: &ThreadAttachment, key: &[u8], value: u64) -> SetResult {
        self.maybe_assist_migration(attachment);

        let hash = hash64(key);
        let half = half_hash(hash);
        crate::debug_log!("op_set: key of {} bytes, hash {hash:#x}, half {half:#x}", key.len());

        for attempt in 0..MAX_OP_RETRIES {
            if attempt > 0 {
                crate::debug_log!("op_set: retry {attempt} for hash {hash:#x}");
            }
            let kv_guard = attachment.pin_key_value();
            let data_guard = attachment.pin_data();
            let current_ptr = self.data.load(Ordering::Acquire);
            let current = unsafe { &*current_ptr };

            match find_bucket(current, hash, half, key, false) {
                FindResult::Hit { slot, transaction_id, record: old_record } => {
                    let old_value = unsafe { (*old_record).value() };
                    let new_record = KeyValueRecord::alloc(hash, key, value);
                    match slot.try_update(transaction_id, old_record, new_record, half) {
                        Some(retired) => {
                            unsafe { self.gc.retire_record(&kv_guard, retired) };
                            drop(kv_guard);
                            drop(data_guard);
                            return SetResult::Ok { created_new: false, previous_value: old_value };
                        }
                        None => {
                            unsafe { KeyValueRecord::reclaim(new_record) };
                            drop(kv_guard);
                            drop(data_guard);
                            continue;
                        }
                    }
                }
                FindResult::Claimed { .. } | FindResult::Miss => {
                    let new_record = KeyValueRecord::alloc(hash, key, value);
                    match acquire_empty_slot(current, hash, half, new_record) {
                        AcquireResult::Claimed { slot, transaction_id } => {
                            let claimed_index = slot_index(current, slot);
                            if validate_insert(current, hash, half, key, claimed_index) {
                                slot.commit(transaction_id, new_record);
                                self.gc.record_insert(attachment);
                                drop(kv_guard);
                                drop(data_guard);
                                return SetResult::Ok { created_new: true, previous_value: 0 };
                            } else {
                                slot.release_claim(transaction_id, new_record);
                                unsafe { self.gc.retire_record(&kv_guard, new_record) };
                                drop(kv_guard);
                                drop(data_guard);
                                continue;
                            }
                        }
                        AcquireResult::NeedsResizing => {
                            unsafe { KeyValueRecord::reclaim(new_record) };
                            if let Some(dump) = crate::debug_eval!(dump_probe_window(current, hash, half)) {
                                crate::debug_log!("op_set: exhausted window for hash {hash:#x}: {dump}");
                            }
                            drop(kv_guard);
                            drop(data_guard);
                            if current.buckets_count >= self.config.max_buckets {
                                let err = Error::full(format!(
                                    "table at max_buckets ({}) with no room left for this key",
                                    self.config.max_buckets
                                ));
                                error!(%err, "set: table full");
                                return SetResult::Full;
                            }
                            return SetResult::NeedsResizing;
                        }
                    }
                }
            }
        }
        SetResult::TryLater
    }

    /// Tombstones `key` if present.
    pub fn op_delete(&self, attachment: &ThreadAttachment, key: &[u8]) -> DeleteResult {
        self.maybe_assist_migration(attachment);

        let hash = hash64(key);
        let half = half_hash(hash);
        crate::debug_log!("op_delete: key of {} bytes, hash {hash:#x}", key.len());

        for _ in 0..MAX_OP_RETRIES {
            let kv_guard = attachment.pin_key_value();
            let data_guard = attachment.pin_data();
            let current_ptr = self.data.load(Ordering::Acquire);
            let current = unsafe { &*current_ptr };

            match find_bucket(current, hash, half, key, false) {
                FindResult::Hit { slot, transaction_id, record } => {
                    match slot.try_delete(transaction_id, record) {
                        Some(retired) => {
                            unsafe { self.gc.retire_record(&kv_guard, retired) };
                            self.gc.record_delete(attachment);
                            drop(kv_guard);
                            drop(data_guard);
                            return DeleteResult::Deleted;
                        }
                        None => {
                            drop(kv_guard);
                            drop(data_guard);
                            continue;
                        }
                    }
                }
                FindResult::Claimed { .. } | FindResult::Miss => {
                    drop(kv_guard);
                    drop(data_guard);
                    return DeleteResult::NotFound;
                }
            }
        }
        DeleteResult::TryLater
    }

    /// Starts a live resize: doubles the bucket count (capped at
    /// `max_buckets`) and publishes the new array as current. Returns
    /// `false` if another thread is already upsizing or the table is
    /// already at `max_buckets`.
    pub fn upsize_prepare(&self, attachment: &ThreadAttachment) -> bool {
        let _data_guard = attachment.pin_data();
        let started = self
            .upsize
            .prepare(&self.data, self.config.max_buckets, self.config.upsize_block_size);
        if started {
            info!("upsize prepared: migration in progress");
        }
        started
    }

    /// Cooperatively migrates one block's worth of buckets. Returns the
    /// number of buckets actually carrying a record that were migrated (a
    /// normal `0` for an empty block, not an error).
    pub fn upsize_migrate_block(&self, attachment: &ThreadAttachment) -> u64 {
        let kv_guard = attachment.pin_key_value();
        let data_guard = attachment.pin_data();
        let migrated = self.upsize.migrate_block(&self.data, &self.gc, &kv_guard, &data_guard);
        if migrated > 0 {
            trace!(migrated, "migrated upsize block");
        }
        migrated
    }

    /// Whether a live resize is currently in progress.
    pub fn is_upsizing(&self) -> bool {
        self.upsize.is_upsizing()
    }

    fn maybe_assist_migration(&self, attachment: &ThreadAttachment) {
        if self.upsize.is_upsizing() {
            self.upsize_migrate_block(attachment);
        }
    }
}

impl Drop for Table {
    fn drop(&mut self) {
        let current = self.data.swap(ptr::null_mut(), Ordering::AcqRel);
        if !current.is_null() {
            drop_data_and_records(current);
        }
        let from = self.upsize.from_ptr();
        if !from.is_null() {
            drop_data_and_records(from);
        }
    }
}

/// Frees a `Data` array and every live record it still references.
/// Invoked only from `Drop`, which requires no concurrent users, so no
/// epoch guard is needed here.
fn drop_data_and_records(data_ptr: *mut Data) {
    let data = unsafe { Box::from_raw(data_ptr) };
    for idx in 0..data.buckets_count_real {
        let view = data.bucket(idx).load(Ordering::Relaxed);
        match view.slot {
            Slot::Occupied(ptr) | Slot::Temporary(ptr) => unsafe { KeyValueRecord::reclaim(ptr) },
            Slot::Empty | Slot::Tombstone | Slot::Migrated => {}
        }
    }
}

fn num_cpus_hint() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

/// Renders the tag of every slot in `hash`'s probe window, for the
/// `KV_TABLE_DEBUG` dump on window exhaustion. Not called unless debug
/// logging is enabled for this module; formatting a whole window isn't
/// free, which is exactly what [`debug_eval!`](crate::debug_eval) gates.
#[cfg_attr(not(feature = "debug-logging"), allow(dead_code))]
fn dump_probe_window(data: &Data, hash: u64, half: u32) -> String {
    let start = bucket_index(hash, data.buckets_count_mask);
    let mut out = String::new();
    for offset in 0..LINEAR_SEARCH_RANGE {
        let idx = start + offset;
        if idx >= data.buckets_count_real {
            break;
        }
        let view = data.bucket(idx).load(Ordering::Relaxed);
        let tag = match view.slot {
            Slot::Empty => 'E',
            Slot::Occupied(_) => 'O',
            Slot::Temporary(_) => 'T',
            Slot::Tombstone => 'D',
            Slot::Migrated => 'M',
        };
        let marker = if view.hash_half == half { tag } else { tag.to_ascii_lowercase() };
        out.push(marker);
    }
    out
}

// SAFETY: `Table` only ever exposes its bucket state through atomics and
// epoch-guarded record pointers; no method hands out a borrow that
// outlives its guard.
unsafe impl Send for Table {}
unsafe impl Sync for Table {}
