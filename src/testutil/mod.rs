//! Test-only helpers. Not part of the table's production surface.

/// Authoritative per-key status table used by the fuzzy concurrency test.
pub mod dedup_table;

pub use dedup_table::{DedupTable, KeyStatus};
