//! Thread-facing system utilities: CPU affinity hookpoints.
//!
//! Thread *attachment* (GC registration) lives on [`crate::kv::Table`]
//! itself, since each table owns its own GC domains — see
//! [`crate::kv::ThreadAttachment`]. This module is only the optional,
//! table-independent affinity pinning a host may use after registering.

/// CPU affinity hookpoints.
pub mod thread;
