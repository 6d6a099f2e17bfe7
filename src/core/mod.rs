//! Core ambient components shared across the table implementation.
//!
//! This module holds the parts of the crate that aren't the concurrent
//! data structure itself: configuration and the debug-logging macros.

/// Table configuration.
pub mod config;

/// Debug-gated logging macros for the hot path.
pub mod logging;

pub use config::TableConfig;
