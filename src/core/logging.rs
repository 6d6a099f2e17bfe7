//! Env-var-gated debug logging for the hot path.
//!
//! `tracing` spans/events cover lifecycle boundaries (table init, upsize
//! prepare/complete, fatal `FULL`) everywhere else in this crate — see
//! call sites in `kv::table` and `kv::upsize`. This module is only for the
//! per-operation trace that would dominate cost at millions of ops/sec if
//! it were a normal `tracing::trace!` call; it compiles to nothing unless
//! the `debug-logging` feature is enabled, and even then is a no-op unless
//! `KV_TABLE_DEBUG` names the calling module at runtime.

/// Runtime configuration for debug logging, read once from the environment.
#[cfg(feature = "debug-logging")]
pub mod config {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::OnceLock;

    /// Parsed `KV_TABLE_DEBUG` state.
    pub struct DebugConfig {
        enabled: AtomicBool,
        patterns: Vec<String>,
    }

    static CONFIG: OnceLock<DebugConfig> = OnceLock::new();

    impl DebugConfig {
        fn load() -> &'static Self {
            CONFIG.get_or_init(|| {
                let raw = std::env::var("KV_TABLE_DEBUG").ok();
                let enabled = matches!(
                    raw.as_deref(),
                    Some("1") | Some("all") | Some("true") | Some("TRUE")
                );
                let patterns = match raw.as_deref() {
                    Some(v) if !enabled => vec![v.to_string()],
                    _ => Vec::new(),
                };
                DebugConfig {
                    enabled: AtomicBool::new(enabled),
                    patterns,
                }
            })
        }

        /// Whether debug logging is enabled for a given module path.
        pub fn is_enabled(module_path: &str) -> bool {
            let config = Self::load();
            if config.enabled.load(Ordering::Relaxed) {
                return true;
            }
            config.patterns.iter().any(|p| module_path.contains(p.as_str()))
        }
    }

    /// Whether debug logging is enabled for a given module path.
    pub fn is_debug_enabled(module_path: &str) -> bool {
        DebugConfig::is_enabled(module_path)
    }
}

/// Stub used when the `debug-logging` feature is off: always disabled, and
/// the branch is dead code the compiler can eliminate entirely.
#[cfg(not(feature = "debug-logging"))]
pub mod config {
    #[allow(dead_code)]
    pub fn is_debug_enabled(_module_path: &str) -> bool {
        false
    }
}

/// Debug print gated by `KV_TABLE_DEBUG`, zero-cost when the feature is off.
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        #[cfg(feature = "debug-logging")]
        {
            let module_path = concat!(module_path!(), "::", file!());
            if $crate::core::logging::config::is_debug_enabled(module_path) {
                eprintln!($($arg)*);
            }
        }
    };
}

/// Evaluates an expression only when debug logging is enabled; use for
/// diagnostics whose computation itself isn't free (e.g. formatting a
/// descriptor's full bit layout).
#[macro_export]
macro_rules! debug_eval {
    ($expr:expr) => {{
        #[cfg(feature = "debug-logging")]
        {
            let module_path = concat!(module_path!(), "::", file!());
            if $crate::core::logging::config::is_debug_enabled(module_path) {
                Some($expr)
            } else {
                None
            }
        }
        #[cfg(not(feature = "debug-logging"))]
        {
            None::<()>
        }
    }};
}
