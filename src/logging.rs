//! Logging setup and per-frame spam control

use std::sync::atomic::{AtomicBool, Ordering};

/// Initialise `env_logger` once; later calls are no-ops.
///
/// `RUST_LOG` still wins over `default_filter` when it is set.
pub fn init_logging(default_filter: &str) {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_millis()
        .try_init();
}

/// Logger hook for tests: captured output, quiet unless `RUST_LOG` says otherwise
pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Latch that lets a recurring per-frame failure be reported once.
#[derive(Debug, Default)]
pub struct LogOnce {
    fired: AtomicBool,
}

impl LogOnce {
    pub const fn new() -> Self {
        Self {
            fired: AtomicBool::new(false),
        }
    }

    /// True the first time only
    pub fn first(&self) -> bool {
        !self.fired.swap(true, Ordering::Relaxed)
    }

    /// Re-arm, e.g. after the failing condition cleared
    pub fn reset(&self) {
        self.fired.store(false, Ordering::Relaxed);
    }
}
