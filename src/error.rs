//! Crate-wide error type.
//!
//! Hot-path operations (`op_get`/`op_set`/`op_delete`) do not return this
//! type: `NEEDS_RESIZING` and `TRY_LATER` are expected control flow a
//! caller retries on, not failures, so they live in their own discriminant
//! enums next to each operation (`kv::table::GetResult` and friends). This
//! `Error` enum is for the handful of things that are genuinely exceptional:
//! an invalid configuration, or the table having grown to `max_buckets`
//! with no room left for a new key.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum Error {
    /// A `TableConfig` failed validation before the table could be built.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The table cannot accept the insert: it is already at `max_buckets`
    /// and every bucket in the key's probe window is occupied.
    #[error("table is full: {0}")]
    Full(String),

    /// A descriptor, tag, or upsize-state combination was observed that the
    /// invariants in the design say cannot occur. Surfacing this as an
    /// error (rather than a panic) lets a host decide whether to abort the
    /// process or just drop the offending connection.
    #[error("hash table invariant violated: {0}")]
    InvariantViolation(String),
}

impl Error {
    /// Builds a [`Error::Config`] from anything displayable.
    pub fn config(msg: impl std::fmt::Display) -> Self {
        Error::Config(msg.to_string())
    }

    /// Builds a [`Error::Full`] from anything displayable.
    pub fn full(msg: impl std::fmt::Display) -> Self {
        Error::Full(msg.to_string())
    }

    /// Builds a [`Error::InvariantViolation`] from anything displayable.
    pub fn invariant(msg: impl std::fmt::Display) -> Self {
        Error::InvariantViolation(msg.to_string())
    }
}
