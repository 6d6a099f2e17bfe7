//! A minimal per-key status oracle for the fuzzy concurrency test.
//!
//! One `{key -> status}` record per key, consulted and updated by the
//! fuzz test itself, never by the table under test — this lets a
//! multi-threaded fuzz run decide what the *last* writer's outcome for a
//! key should have been without racing against the table to find out.
//! Not part of the performance-critical core, so unlike
//! `kv::descriptor::BucketSlot` it's a plain `Mutex`-guarded map rather
//! than a lock-free structure.

use std::collections::HashMap;
use std::sync::Mutex;

/// A key's authoritative state, maintained by the test harness itself
/// (not derived from the table under test).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStatus {
    /// The harness has set this key and not yet deleted it.
    Inserted(u64),
    /// The harness has deleted this key (or never inserted it).
    Deleted,
}

/// Sharded `key -> status` map. Each key maps to exactly one shard by
/// hash, so concurrent operations on different keys never contend on the
/// same lock.
pub struct DedupTable {
    shards: Vec<Mutex<HashMap<Vec<u8>, KeyStatus>>>,
}

impl DedupTable {
    /// Builds a table with `shard_count` independent locks.
    pub fn new(shard_count: usize) -> Self {
        let shard_count = shard_count.max(1);
        DedupTable {
            shards: (0..shard_count).map(|_| Mutex::new(HashMap::new())).collect(),
        }
    }

    fn shard_for(&self, key: &[u8]) -> &Mutex<HashMap<Vec<u8>, KeyStatus>> {
        let hash = crate::kv::hash_key(key);
        &self.shards[(hash as usize) % self.shards.len()]
    }

    /// Runs `f` with exclusive access to `key`'s status, inserting
    /// `KeyStatus::Deleted` as the default if the key has never been seen.
    /// This is the "lock, read authoritative status, perform op, update
    /// status, unlock" step the fuzzy test performs around every
    /// `op_get`/`op_set`/`op_delete` call.
    pub fn with_status<R>(&self, key: &[u8], f: impl FnOnce(&mut KeyStatus) -> R) -> R {
        let shard = self.shard_for(key);
        let mut map = shard.lock().expect("dedup table mutex poisoned");
        let status = map.entry(key.to_vec()).or_insert(KeyStatus::Deleted);
        f(status)
    }

    /// Snapshot read, for assertions outside the lock/op/unlock cycle.
    pub fn status_of(&self, key: &[u8]) -> KeyStatus {
        let shard = self.shard_for(key);
        let map = shard.lock().expect("dedup table mutex poisoned");
        map.get(key).copied().unwrap_or(KeyStatus::Deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unseen_key_is_deleted() {
        let table = DedupTable::new(4);
        assert_eq!(table.status_of(b"nope"), KeyStatus::Deleted);
    }

    #[test]
    fn with_status_mutates_in_place() {
        let table = DedupTable::new(4);
        table.with_status(b"k", |status| *status = KeyStatus::Inserted(42));
        assert_eq!(table.status_of(b"k"), KeyStatus::Inserted(42));
        table.with_status(b"k", |status| *status = KeyStatus::Deleted);
        assert_eq!(table.status_of(b"k"), KeyStatus::Deleted);
    }
}
