/// Buffer Pool Implementation
///
/// Budgeted device buffer recycling for per-frame sort storage. Buffers handed
/// out as [`PooledBuffer`] go back to the free list when dropped, so a sorter
/// that prepares every frame reuses last frame's allocations.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::PoolConfig;
use crate::error::{allocation_error, SortResult};
use crate::gpu::ComputeBackend;

/// Which free buffer satisfies a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationStrategy {
    /// First buffer that fits
    FirstFit,
    /// Smallest buffer that fits (least waste)
    #[default]
    BestFit,
    /// Largest buffer first
    WorstFit,
}

/// Pool counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Buffers created on the device
    pub allocations: u64,
    /// Requests served from the free list
    pub reuses: u64,
    /// Requests refused for lack of budget or device memory
    pub failures: u64,
    /// Bytes of every buffer the pool owns, free or handed out
    pub allocated_bytes: u64,
    /// Bytes currently handed out
    pub in_use_bytes: u64,
    pub free_buffers: usize,
}

struct FreeBuffer<T> {
    buffer: T,
    capacity: u32,
}

struct PoolInner<T> {
    config: PoolConfig,
    free: Vec<FreeBuffer<T>>,
    stats: PoolStats,
}

impl<T> PoolInner<T> {
    fn find_free(&self, len: u32) -> Option<usize> {
        let mut candidates = self
            .free
            .iter()
            .enumerate()
            .filter(|(_, free)| free.capacity >= len)
            .map(|(idx, free)| (idx, free.capacity));

        match self.config.strategy {
            AllocationStrategy::FirstFit => candidates.next().map(|(idx, _)| idx),
            AllocationStrategy::BestFit => candidates.min_by_key(|(_, cap)| *cap).map(|(idx, _)| idx),
            AllocationStrategy::WorstFit => candidates.max_by_key(|(_, cap)| *cap).map(|(idx, _)| idx),
        }
    }

    /// Drop free buffers, largest first, until `bytes` more fit the budget
    fn evict_for(&mut self, bytes: u64) -> bool {
        while self.stats.allocated_bytes + bytes > self.config.max_bytes {
            let Some(largest) = self
                .free
                .iter()
                .enumerate()
                .max_by_key(|(_, free)| free.capacity)
                .map(|(idx, _)| idx)
            else {
                return false;
            };
            let evicted = self.free.swap_remove(largest);
            self.stats.allocated_bytes -= words_to_bytes(evicted.capacity);
        }
        true
    }
}

fn words_to_bytes(words: u32) -> u64 {
    words as u64 * 4
}

/// Device buffer pool feeding [`Sorter::prepare`](crate::sort::Sorter::prepare)
pub struct BufferPool<B: ComputeBackend> {
    backend: Arc<B>,
    inner: Arc<Mutex<PoolInner<B::Buffer>>>,
}

impl<B: ComputeBackend> BufferPool<B> {
    pub fn new(backend: Arc<B>, config: PoolConfig) -> Self {
        log::debug!(
            "[BufferPool] Created on {} backend: budget {} bytes, {:?}",
            backend.name(),
            config.max_bytes,
            config.strategy
        );
        Self {
            backend,
            inner: Arc::new(Mutex::new(PoolInner {
                config,
                free: Vec::new(),
                stats: PoolStats::default(),
            })),
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Hand out a buffer of at least `len` words.
    ///
    /// Reused buffers keep whatever they held; callers initialise what they
    /// read.
    pub fn acquire(&self, label: &str, len: u32) -> SortResult<PooledBuffer<B::Buffer>> {
        let bytes = words_to_bytes(len);
        let mut inner = self.inner.lock();

        if let Some(idx) = inner.find_free(len) {
            let free = inner.free.swap_remove(idx);
            inner.stats.reuses += 1;
            inner.stats.in_use_bytes += words_to_bytes(free.capacity);
            log::trace!(
                "[BufferPool] Reused {}-word buffer for '{}' ({} words)",
                free.capacity,
                label,
                len
            );
            return Ok(PooledBuffer {
                buffer: Some(free.buffer),
                len,
                capacity: free.capacity,
                pool: Arc::clone(&self.inner),
            });
        }

        if !inner.evict_for(bytes) {
            inner.stats.failures += 1;
            return Err(allocation_error(
                label,
                bytes,
                format!(
                    "pool budget of {} bytes exhausted ({} in use)",
                    inner.config.max_bytes, inner.stats.in_use_bytes
                ),
            ));
        }

        let buffer = match self.backend.create_buffer(label, len) {
            Ok(buffer) => buffer,
            Err(e) => {
                inner.stats.failures += 1;
                return Err(e);
            }
        };
        inner.stats.allocations += 1;
        inner.stats.allocated_bytes += bytes;
        inner.stats.in_use_bytes += bytes;
        log::debug!("[BufferPool] Allocated '{}' ({} bytes)", label, bytes);

        Ok(PooledBuffer {
            buffer: Some(buffer),
            len,
            capacity: len,
            pool: Arc::clone(&self.inner),
        })
    }

    /// Release every free buffer back to the device
    pub fn trim(&self) {
        let mut inner = self.inner.lock();
        let released: u64 = inner.free.iter().map(|f| words_to_bytes(f.capacity)).sum();
        inner.free.clear();
        inner.stats.allocated_bytes -= released;
        if released > 0 {
            log::debug!("[BufferPool] Trimmed {} free bytes", released);
        }
    }

    pub fn stats(&self) -> PoolStats {
        let inner = self.inner.lock();
        PoolStats {
            free_buffers: inner.free.len(),
            ..inner.stats
        }
    }

    pub fn config(&self) -> PoolConfig {
        self.inner.lock().config.clone()
    }
}

/// Buffer on loan from a [`BufferPool`]; returns itself when dropped.
pub struct PooledBuffer<T> {
    buffer: Option<T>,
    len: u32,
    capacity: u32,
    pool: Arc<Mutex<PoolInner<T>>>,
}

impl<T> PooledBuffer<T> {
    /// Requested length in words
    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Actual length in words, at least [`len`](Self::len)
    pub fn capacity(&self) -> u32 {
        self.capacity
    }
}

impl<T: fmt::Debug> fmt::Debug for PooledBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("buffer", &self.buffer)
            .field("len", &self.len)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl<T> Deref for PooledBuffer<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match &self.buffer {
            Some(buffer) => buffer,
            // Only taken in drop
            None => unreachable!("pooled buffer used after release"),
        }
    }
}

impl<T> Drop for PooledBuffer<T> {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            let mut inner = self.pool.lock();
            inner.stats.in_use_bytes -= words_to_bytes(self.capacity);
            inner.free.push(FreeBuffer {
                buffer,
                capacity: self.capacity,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SorterConfig;
    use crate::error::SortError;
    use crate::gpu::CpuBackend;

    fn pool(max_bytes: u64, strategy: AllocationStrategy) -> BufferPool<CpuBackend> {
        let backend = Arc::new(CpuBackend::new(SorterConfig::default()).unwrap());
        BufferPool::new(backend, PoolConfig { max_bytes, strategy })
    }

    #[test]
    fn test_dropped_buffers_are_reused() {
        let pool = pool(1 << 20, AllocationStrategy::BestFit);
        let first = pool.acquire("keys", 256).unwrap();
        assert_eq!(pool.stats().in_use_bytes, 1024);
        drop(first);
        assert_eq!(pool.stats().in_use_bytes, 0);
        assert_eq!(pool.stats().free_buffers, 1);

        let second = pool.acquire("keys", 200).unwrap();
        assert_eq!(second.len(), 200);
        assert_eq!(second.capacity(), 256);
        let stats = pool.stats();
        assert_eq!(stats.allocations, 1);
        assert_eq!(stats.reuses, 1);
        assert_eq!(stats.allocated_bytes, 1024);
    }

    #[test]
    fn test_strategy_picks_candidate() {
        for (strategy, expected) in [
            (AllocationStrategy::BestFit, 128),
            (AllocationStrategy::WorstFit, 512),
        ] {
            let pool = pool(1 << 20, strategy);
            let a = pool.acquire("a", 512).unwrap();
            let b = pool.acquire("b", 128).unwrap();
            let c = pool.acquire("c", 256).unwrap();
            drop((a, b, c));

            let picked = pool.acquire("d", 100).unwrap();
            assert_eq!(picked.capacity(), expected, "{:?}", strategy);
        }
    }

    #[test]
    fn test_pooled_buffer_debug_shows_lengths() {
        let pool = pool(1 << 20, AllocationStrategy::BestFit);
        let buffer = pool.acquire("debug", 24).unwrap();
        let text = format!("{:?}", buffer);
        assert!(text.starts_with("PooledBuffer"), "{}", text);
        assert!(text.contains("len: 24"), "{}", text);
        assert!(text.contains("capacity: 24"), "{}", text);
    }

    #[test]
    fn test_budget_exhaustion_is_allocation_failure() {
        let pool = pool(4096, AllocationStrategy::FirstFit);
        let _held = pool.acquire("keys", 768).unwrap();
        let err = pool.acquire("values", 512).unwrap_err();
        assert!(matches!(err, SortError::AllocationFailed { .. }));
        assert!(err.is_fallback());
        assert_eq!(pool.stats().failures, 1);
    }

    #[test]
    fn test_free_buffers_are_evicted_for_budget() {
        let pool = pool(4096, AllocationStrategy::FirstFit);
        drop(pool.acquire("small", 256).unwrap());
        // 256 free words plus 1000 new words would exceed 1024 words
        let big = pool.acquire("big", 1000).unwrap();
        assert_eq!(big.capacity(), 1000);
        let stats = pool.stats();
        assert_eq!(stats.free_buffers, 0);
        assert_eq!(stats.allocated_bytes, 4000);
    }

    #[test]
    fn test_trim_releases_free_buffers() {
        let pool = pool(1 << 20, AllocationStrategy::BestFit);
        let held = pool.acquire("held", 64).unwrap();
        drop(pool.acquire("free", 64).unwrap());
        pool.trim();
        let stats = pool.stats();
        assert_eq!(stats.free_buffers, 0);
        assert_eq!(stats.allocated_bytes, 256);
        drop(held);
    }
}
