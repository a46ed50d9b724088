/// Sort storage memory management
///
/// Budgeted buffer recycling for the sorter's per-frame key, value and cache
/// buffers.

pub mod buffer_pool;

pub use buffer_pool::{AllocationStrategy, BufferPool, PoolStats, PooledBuffer};

use serde::{Deserialize, Serialize};

/// Buffer pool configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum bytes the pool may hold, free and in use together
    pub max_bytes: u64,

    /// Free buffer selection
    pub strategy: AllocationStrategy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_bytes: 256 * 1024 * 1024, // 256MB
            strategy: AllocationStrategy::BestFit,
        }
    }
}
