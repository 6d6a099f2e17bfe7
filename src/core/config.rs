//! Table configuration.
//!
//! This crate has no CLI or config-file loader of its own — that belongs to
//! the protocol/dispatcher layer that embeds this table. `TableConfig` is
//! still `serde`-derived so a host process can fold it into its own config.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Minimum number of buckets a table may be initialised with.
///
/// Below this the fixed linear-probe window used by `find_bucket` (see
/// `kv::hash`) can't be guaranteed to terminate usefully.
pub const MIN_INITIAL_BUCKETS: u64 = 16;

/// Default number of buckets migrated per cooperative upsize step when a
/// thread lends work opportunistically.
pub const DEFAULT_UPSIZE_BLOCK_SIZE: u32 = 64;

/// Configuration recognized at table initialisation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TableConfig {
    /// Number of buckets the table starts with. Must be a power of two,
    /// at least [`MIN_INITIAL_BUCKETS`].
    pub initial_buckets: u64,

    /// Upper bound on the number of buckets the table may grow to. Upsize
    /// requests beyond this return `NEEDS_RESIZING` forever (caller error,
    /// not a table defect).
    pub max_buckets: u64,

    /// Number of buckets migrated per `upsize_migrate_block` call.
    pub upsize_block_size: u32,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            initial_buckets: 1 << 16,
            max_buckets: 1 << 32,
            upsize_block_size: DEFAULT_UPSIZE_BLOCK_SIZE,
        }
    }
}

impl TableConfig {
    /// Validates the configuration, returning the populated struct on
    /// success. `table_init` calls this before allocating anything.
    pub fn validate(self) -> Result<Self> {
        if !self.initial_buckets.is_power_of_two() || self.initial_buckets < MIN_INITIAL_BUCKETS {
            return Err(Error::config(format!(
                "initial_buckets must be a power of two >= {MIN_INITIAL_BUCKETS}, got {}",
                self.initial_buckets
            )));
        }
        if !self.max_buckets.is_power_of_two() || self.max_buckets < self.initial_buckets {
            return Err(Error::config(format!(
                "max_buckets ({}) must be a power of two >= initial_buckets ({})",
                self.max_buckets, self.initial_buckets
            )));
        }
        if self.upsize_block_size == 0 {
            return Err(Error::config("upsize_block_size must be non-zero"));
        }
        Ok(self)
    }
}
