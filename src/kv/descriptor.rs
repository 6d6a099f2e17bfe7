//! The packed bucket descriptor.
//!
//! A single 128-bit atomically CAS-able word holding a 32-bit transaction
//! id, a 32-bit half-hash, and a 64-bit tagged pointer would be the
//! natural design, but stable Rust has no portable double-word CAS, so
//! this splits the word in two:
//!
//! - `descriptor: AtomicU64` packs `{transaction_id: 16 bits} << 48 |
//!   {tagged pointer: 48 bits}`. A real pointer's low 3 bits are always
//!   zero (every allocation here is at least 8-byte aligned), so those
//!   bits carry the tag. This one atomic is the sole linearization point
//!   for every state transition a bucket goes through.
//! - `hash_half: AtomicU32` is a separate fast pre-filter, written after
//!   the pointer on insert and read before it on probe. It may be
//!   transiently stale relative to `descriptor` (a probe can see a
//!   half-hash that doesn't yet correspond to a committed pointer, or a
//!   half-hash that hasn't been cleared after a delete) — that's benign:
//!   `find_bucket` always re-derives ground truth from `descriptor` and
//!   the record it points to, using `hash_half` only to skip buckets
//!   cheaply before touching the pointer.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use super::record::KeyValueRecord;

const TAG_BITS: u64 = 3;
const TAG_MASK: u64 = (1 << TAG_BITS) - 1;
const PTR_FIELD_MASK: u64 = 0x0000_FFFF_FFFF_FFFF;
const TRANSACTION_ID_SHIFT: u32 = 48;

/// Low-bit tag carried on the descriptor's pointer field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
enum Tag {
    /// A committed record pointer (or, with a null pointer, an empty slot).
    Valid = 0,
    /// An insert has claimed this slot but not yet validated.
    Temporary = 1,
    /// Slot previously held a record that was deleted; probes must keep
    /// scanning past it, inserts may reclaim it.
    Tombstone = 2,
    /// Slot's record was migrated to the new `data` array during an
    /// upsize; readers must consult the new array instead.
    Migrated = 3,
}

/// What a bucket's descriptor currently represents, after untangling the
/// transaction id, tag and pointer bits.
#[derive(Debug, Clone, Copy)]
pub enum Slot {
    /// Never occupied (or occupied and then migrated all the way back to
    /// empty — this never happens in practice, but `Empty` and `Migrated`
    /// are kept as distinct variants so callers can't confuse them).
    Empty,
    /// A claimed-but-unvalidated insert. The pointer already refers to a
    /// fully populated record; only the commit is pending.
    Temporary(*mut KeyValueRecord),
    /// Previously occupied, now deleted.
    Tombstone,
    /// Migrated to the table's current `data` array.
    Migrated,
    /// A committed, readable record.
    Occupied(*mut KeyValueRecord),
}

fn pack(transaction_id: u16, tag: Tag, ptr_bits: u64) -> u64 {
    debug_assert_eq!(ptr_bits & TAG_MASK, 0, "pointer must be tag-bit aligned");
    ((transaction_id as u64) << TRANSACTION_ID_SHIFT) | (ptr_bits & PTR_FIELD_MASK) | (tag as u64)
}

fn unpack(word: u64) -> (u16, Tag, u64) {
    let transaction_id = (word >> TRANSACTION_ID_SHIFT) as u16;
    let low = word & PTR_FIELD_MASK;
    let tag_bits = low & TAG_MASK;
    let ptr_bits = low & !TAG_MASK;
    let tag = match tag_bits {
        0 => Tag::Valid,
        1 => Tag::Temporary,
        2 => Tag::Tombstone,
        3 => Tag::Migrated,
        _ => unreachable!("3-bit tag field"),
    };
    (transaction_id, tag, ptr_bits)
}

fn classify(tag: Tag, ptr_bits: u64) -> Slot {
    match tag {
        Tag::Valid if ptr_bits == 0 => Slot::Empty,
        Tag::Valid => Slot::Occupied(ptr_bits as *mut KeyValueRecord),
        Tag::Temporary => Slot::Temporary(ptr_bits as *mut KeyValueRecord),
        Tag::Tombstone => Slot::Tombstone,
        Tag::Migrated => Slot::Migrated,
    }
}

/// One bucket's worth of atomic state: the packed descriptor plus its
/// fast-filter half-hash, laid out adjacently so a probe that misses on
/// `hash_half` never has to touch the (larger, less cache-friendly)
/// descriptor word at all.
#[derive(Debug)]
pub struct BucketSlot {
    descriptor: AtomicU64,
    hash_half: AtomicU32,
}

/// A consistent-enough-to-act-on snapshot of one bucket, taken with a
/// single acquire-load of `hash_half` followed by a single acquire-load of
/// `descriptor`. The two loads are not atomic together; every caller must
/// treat `hash_half` as a hint and re-validate against `descriptor`/the
/// record it names, which is what every read path here already does.
#[derive(Debug, Clone, Copy)]
pub struct BucketView {
    pub transaction_id: u16,
    pub hash_half: u32,
    pub slot: Slot,
}

impl Default for BucketSlot {
    fn default() -> Self {
        BucketSlot {
            descriptor: AtomicU64::new(0),
            hash_half: AtomicU32::new(0),
        }
    }
}

impl BucketSlot {
    /// Loads the bucket's half-hash and descriptor, in that order, each
    /// with acquire ordering.
    pub fn load(&self, order: Ordering) -> BucketView {
        let hash_half = self.hash_half.load(order);
        let word = self.descriptor.load(order);
        let (transaction_id, tag, ptr_bits) = unpack(word);
        BucketView { transaction_id, hash_half, slot: classify(tag, ptr_bits) }
    }

    /// Raw descriptor word, for use as the `current` argument to a CAS.
    fn raw(&self, order: Ordering) -> u64 {
        self.descriptor.load(order)
    }

    /// Attempts to CAS an empty or tombstoned slot into `Temporary`,
    /// claiming it for an in-progress insert. Returns the new transaction
    /// id on success.
    pub fn try_claim(&self, record_ptr: *mut KeyValueRecord, hash_half: u32) -> Option<u16> {
        let current = self.raw(Ordering::Acquire);
        let (transaction_id, tag, _) = unpack(current);
        if !matches!(tag, Tag::Valid | Tag::Tombstone) {
            return None;
        }
        if tag == Tag::Valid && current & PTR_FIELD_MASK != 0 {
            return None;
        }
        let next_tid = transaction_id.wrapping_add(1);
        let new_word = pack(next_tid, Tag::Temporary, record_ptr as u64);
        match self.descriptor.compare_exchange(
            current,
            new_word,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                // hash_half is published after the pointer: a concurrent
                // prober that sees the new pointer before this store will
                // simply not match on hash_half yet and skip the slot.
                self.hash_half.store(hash_half, Ordering::Release);
                Some(next_tid)
            }
            Err(_) => None,
        }
    }

    /// Commits a previously claimed `Temporary` slot to `Occupied`,
    /// clearing the tag bit without touching the pointer or transaction id.
    pub fn commit(&self, expected_transaction_id: u16, record_ptr: *mut KeyValueRecord) -> bool {
        let expected = pack(expected_transaction_id, Tag::Temporary, record_ptr as u64);
        let committed = pack(expected_transaction_id, Tag::Valid, record_ptr as u64);
        self.descriptor
            .compare_exchange(expected, committed, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Releases a claimed slot back to empty after a failed validation,
    /// bumping the transaction id so any stale CAS using the old word fails.
    pub fn release_claim(&self, expected_transaction_id: u16, record_ptr: *mut KeyValueRecord) -> bool {
        let expected = pack(expected_transaction_id, Tag::Temporary, record_ptr as u64);
        let released = pack(expected_transaction_id.wrapping_add(1), Tag::Valid, 0);
        let ok = self
            .descriptor
            .compare_exchange(expected, released, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if ok {
            self.hash_half.store(0, Ordering::Release);
        }
        ok
    }

    /// Swaps a committed record pointer for a new one (update-in-place),
    /// returning the previous pointer on success so the caller can retire
    /// it.
    pub fn try_update(
        &self,
        expected_transaction_id: u16,
        old_ptr: *mut KeyValueRecord,
        new_ptr: *mut KeyValueRecord,
        hash_half: u32,
    ) -> Option<*mut KeyValueRecord> {
        let expected = pack(expected_transaction_id, Tag::Valid, old_ptr as u64);
        let next_tid = expected_transaction_id.wrapping_add(1);
        let updated = pack(next_tid, Tag::Valid, new_ptr as u64);
        match self.descriptor.compare_exchange(
            expected,
            updated,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                self.hash_half.store(hash_half, Ordering::Release);
                Some(old_ptr)
            }
            Err(_) => None,
        }
    }

    /// Marks a committed slot as deleted, returning the retired pointer.
    pub fn try_delete(&self, expected_transaction_id: u16, old_ptr: *mut KeyValueRecord) -> Option<*mut KeyValueRecord> {
        let expected = pack(expected_transaction_id, Tag::Valid, old_ptr as u64);
        let next_tid = expected_transaction_id.wrapping_add(1);
        let tombstoned = pack(next_tid, Tag::Tombstone, 0);
        match self.descriptor.compare_exchange(
            expected,
            tombstoned,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                self.hash_half.store(0, Ordering::Release);
                Some(old_ptr)
            }
            Err(_) => None,
        }
    }

    /// Marks a migration source slot so further readers follow the "look
    /// in the new array instead" path. Idempotent: migrating the same
    /// slot twice is a no-op the second time because the tag is already
    /// `Migrated` and the CAS below is skipped by the caller first.
    pub fn try_mark_migrated(&self, expected_transaction_id: u16, old_ptr: *mut KeyValueRecord) -> bool {
        let expected = pack(expected_transaction_id, Tag::Valid, old_ptr as u64);
        let next_tid = expected_transaction_id.wrapping_add(1);
        let migrated = pack(next_tid, Tag::Migrated, 0);
        let ok = self
            .descriptor
            .compare_exchange(expected, migrated, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if ok {
            self.hash_half.store(0, Ordering::Release);
        }
        ok
    }

    /// Publishes a record directly into an empty or tombstoned destination
    /// slot during migration, skipping the temporary/validate dance:
    /// migration holds exclusivity over the destination slot by virtue of
    /// being the only writer touching `to` for that key during upsize.
    pub fn try_publish_migrated(&self, record_ptr: *mut KeyValueRecord, hash_half: u32) -> bool {
        let current = self.raw(Ordering::Acquire);
        let (transaction_id, tag, _) = unpack(current);
        if !matches!(tag, Tag::Valid | Tag::Tombstone) || (tag == Tag::Valid && current & PTR_FIELD_MASK != 0) {
            return false;
        }
        let next_tid = transaction_id.wrapping_add(1);
        let new_word = pack(next_tid, Tag::Valid, record_ptr as u64);
        let ok = self
            .descriptor
            .compare_exchange(current, new_word, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if ok {
            self.hash_half.store(hash_half, Ordering::Release);
        }
        ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_slot_is_empty() {
        let slot = BucketSlot::default();
        let view = slot.load(Ordering::Acquire);
        assert!(matches!(view.slot, Slot::Empty));
        assert_eq!(view.hash_half, 0);
    }

    #[test]
    fn claim_commit_round_trip() {
        let slot = BucketSlot::default();
        let record = KeyValueRecord::alloc(1, b"k", 99);
        let tid = slot.try_claim(record, 0x8000_0001).expect("claim should succeed on empty slot");
        let view = slot.load(Ordering::Acquire);
        assert!(matches!(view.slot, Slot::Temporary(p) if p == record));
        assert!(slot.commit(tid, record));
        let view = slot.load(Ordering::Acquire);
        assert!(matches!(view.slot, Slot::Occupied(p) if p == record));
        unsafe { KeyValueRecord::reclaim(record) };
    }

    #[test]
    fn double_claim_fails() {
        let slot = BucketSlot::default();
        let record_a = KeyValueRecord::alloc(1, b"a", 1);
        let record_b = KeyValueRecord::alloc(2, b"b", 2);
        let tid = slot.try_claim(record_a, 1).unwrap();
        assert!(slot.try_claim(record_b, 2).is_none());
        slot.commit(tid, record_a);
        unsafe {
            KeyValueRecord::reclaim(record_a);
            KeyValueRecord::reclaim(record_b);
        }
    }

    #[test]
    fn delete_then_claim_reuses_slot() {
        let slot = BucketSlot::default();
        let record = KeyValueRecord::alloc(1, b"k", 1);
        let tid = slot.try_claim(record, 7).unwrap();
        slot.commit(tid, record);
        let deleted_tid = slot.load(Ordering::Acquire).transaction_id;
        let old = slot.try_delete(deleted_tid, record).unwrap();
        assert_eq!(old, record);
        assert!(matches!(slot.load(Ordering::Acquire).slot, Slot::Tombstone));

        let replacement = KeyValueRecord::alloc(9, b"k2", 2);
        let new_tid = slot.try_claim(replacement, 11).expect("tombstone is reclaimable");
        assert!(slot.commit(new_tid, replacement));

        unsafe {
            KeyValueRecord::reclaim(record);
            KeyValueRecord::reclaim(replacement);
        }
    }
}
