//! # kv-table-core
//!
//! A multi-producer/multi-consumer lock-free hash table backing a
//! high-throughput in-memory key-value store compatible with a
//! Redis-like protocol: concurrent `get`/`set`/`delete`, live cooperative
//! resizing, and epoch-based reclamation of both key-value records and
//! retired table-data arrays.
//!
//! Out of scope (contract-only collaborators): the wire protocol, the
//! network/worker threading harness, the command dispatcher, and CLI/file
//! configuration loading. [`crate::system::thread`] exposes the affinity
//! hookpoint such a harness would use; it is never called by the table
//! itself.

#![warn(missing_docs)]

/// Ambient configuration and debug-logging macros.
pub mod core;

/// Crate-wide error type.
pub mod error;

/// The concurrent hash table: bucket descriptors, records, hashing,
/// epoch reclamation, and the live-resize engine.
pub mod kv;

/// Thread affinity hookpoints.
pub mod system;

/// Test-only helpers (fuzzy-test dedup oracle). Not part of the
/// production surface; exported so integration tests under `tests/` can
/// use it.
#[doc(hidden)]
pub mod testutil;

pub use core::TableConfig;
pub use error::{Error, Result};
pub use kv::{DeleteResult, GetResult, SetResult, Table, ThreadAttachment};
