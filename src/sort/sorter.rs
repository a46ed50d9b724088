//! Sorter orchestrator
//!
//! Owns the double-buffered key/value storage and the scan cache, tracks the
//! generation cursor, and records the LSD radix sort:
//!
//! ```text
//! prepare(N) -> generate_batch()* | upload_keys()* -> sort() -> sorted_values()
//!                                                   \-> key_bits x {UpSweep, GroupScan, DownSweep}
//! ```
//!
//! The sorter only records work into the caller's encoder. Nothing runs until
//! the caller flushes it through the backend.

use std::sync::Arc;

use crate::constants::align_up;
use crate::constants::sort::{PADDING_KEY, PADDING_VALUE};
use crate::error::{contract_violation, SortError, SortResult};
use crate::gpu::{ComputeBackend, KernelBindings, SweepUniforms};
use crate::logging::LogOnce;
use crate::memory::{BufferPool, PooledBuffer};

use super::keygen::GenerateParams;

/// Observable lifecycle of a [`Sorter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SorterState {
    /// Nothing allocated
    Empty,
    /// Storage allocated, cursor below the element count
    Prepared,
    /// Every element generated
    Filled,
    /// Sort recorded; sorted values readable
    Sorted,
}

struct SortStorage<T> {
    keys: [PooledBuffer<T>; 2],
    values: [PooledBuffer<T>; 2],
    cache: PooledBuffer<T>,
}

/// Word lengths of the buffers a prepared sorter holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageLens {
    pub keys: [u32; 2],
    pub values: [u32; 2],
    pub cache: u32,
}

/// Read-only view of the sorted values.
///
/// Holds the first [`len`](Self::len) entries of the buffer; anything past
/// that is padding. Borrowing the sorter keeps it valid.
#[derive(Debug, Clone, Copy)]
pub struct SortedValues<'a, T> {
    buffer: &'a T,
    len: u32,
}

impl<'a, T> SortedValues<'a, T> {
    pub fn buffer(&self) -> &'a T {
        self.buffer
    }

    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

pub struct Sorter<B: ComputeBackend> {
    backend: Arc<B>,
    state: SorterState,
    total_count: u32,
    aligned_count: u32,
    group_count: u32,
    write_cursor: u32,
    current: usize,
    storage: Option<SortStorage<B::Buffer>>,
    fallback: LogOnce,
}

impl<B: ComputeBackend> Sorter<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            state: SorterState::Empty,
            total_count: 0,
            aligned_count: 0,
            group_count: 0,
            write_cursor: 0,
            current: 0,
            storage: None,
            fallback: LogOnce::new(),
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Allocate storage for `count` elements from `pool`.
    ///
    /// Allocation failure leaves the sorter empty and is not fatal: the
    /// caller draws this batch unsorted. A prepared sorter is cleared first.
    pub fn prepare(&mut self, pool: &BufferPool<B>, count: u32) -> SortResult<()> {
        if self.state != SorterState::Empty {
            self.clear();
        }
        if !Arc::ptr_eq(pool.backend(), &self.backend) {
            return Err(contract_violation("buffer pool belongs to another backend"));
        }

        let config = self.backend.config();
        let maximum = config.max_element_count();
        if count > maximum {
            if self.fallback.first() {
                log::warn!(
                    "[Sorter] {} elements exceed the single-workgroup scan capacity of {}, drawing unsorted",
                    count,
                    maximum
                );
            } else {
                log::debug!("[Sorter] {} elements still over capacity {}", count, maximum);
            }
            return Err(SortError::CapacityExceeded {
                requested: count,
                maximum,
            });
        }

        let group_size = config.group_size;
        let aligned_count = align_up(count, group_size);
        let group_count = aligned_count / group_size;

        if count > 0 {
            match Self::allocate(pool, aligned_count, group_count, group_size) {
                Ok(storage) => {
                    self.fill_padding(&storage, count, aligned_count)?;
                    self.storage = Some(storage);
                    self.fallback.reset();
                }
                Err(e) => {
                    if self.fallback.first() {
                        log::error!("[Sorter] Sort storage unavailable, drawing unsorted: {}", e);
                    } else {
                        log::debug!("[Sorter] Sort storage still unavailable: {}", e);
                    }
                    return Err(e);
                }
            }
        }

        self.total_count = count;
        self.aligned_count = aligned_count;
        self.group_count = group_count;
        self.write_cursor = 0;
        self.current = 0;
        self.state = if count == 0 {
            SorterState::Filled
        } else {
            SorterState::Prepared
        };

        log::debug!(
            "[Sorter] Prepared {} elements ({} aligned, {} groups)",
            count,
            aligned_count,
            group_count
        );
        Ok(())
    }

    fn allocate(
        pool: &BufferPool<B>,
        aligned_count: u32,
        group_count: u32,
        group_size: u32,
    ) -> SortResult<SortStorage<B::Buffer>> {
        // One extra slot for the total of zero bits
        let cache_len = align_up(group_count + 1, group_size);
        Ok(SortStorage {
            keys: [
                pool.acquire("Sort Keys 0", aligned_count)?,
                pool.acquire("Sort Keys 1", aligned_count)?,
            ],
            values: [
                pool.acquire("Sort Values 0", aligned_count)?,
                pool.acquire("Sort Values 1", aligned_count)?,
            ],
            cache: pool.acquire("Sort Cache", cache_len)?,
        })
    }

    /// Padding sorts after every real element and never shows in the view
    fn fill_padding(
        &self,
        storage: &SortStorage<B::Buffer>,
        count: u32,
        aligned_count: u32,
    ) -> SortResult<()> {
        let padding = (aligned_count - count) as usize;
        if padding == 0 {
            return Ok(());
        }
        self.backend
            .write_buffer(&storage.keys[0], count, &vec![PADDING_KEY; padding])?;
        self.backend
            .write_buffer(&storage.values[0], count, &vec![PADDING_VALUE; padding])
    }

    /// True once `prepare` succeeded with a nonzero count
    pub fn ready(&self) -> bool {
        self.state != SorterState::Empty && self.total_count > 0
    }

    /// Elements still to generate before the sort may run
    pub fn remaining(&self) -> u32 {
        self.total_count - self.write_cursor
    }

    /// Claim the next `count` slots at the cursor.
    ///
    /// Overflow is a contract violation; release builds clamp to what is
    /// left and carry on.
    fn claim(&mut self, count: u32, operation: &str) -> SortResult<u32> {
        match self.state {
            SorterState::Empty => {
                return Err(contract_violation(format!("{} before prepare", operation)));
            }
            SorterState::Sorted => {
                return Err(contract_violation(format!("{} after sort", operation)));
            }
            SorterState::Prepared | SorterState::Filled => {}
        }

        let remaining = self.remaining();
        if count <= remaining {
            return Ok(count);
        }
        if cfg!(debug_assertions) {
            return Err(contract_violation(format!(
                "{} of {} elements overflows the {} left of {}",
                operation, count, remaining, self.total_count
            )));
        }
        log::warn!(
            "[Sorter] {} of {} elements clamped to the {} left of {}",
            operation,
            count,
            remaining,
            self.total_count
        );
        Ok(remaining)
    }

    fn advance(&mut self, count: u32) {
        self.write_cursor += count;
        if self.write_cursor == self.total_count {
            self.state = SorterState::Filled;
        }
    }

    /// Record key generation for the next `params.count` elements
    pub fn generate_batch(
        &mut self,
        encoder: &mut B::Encoder,
        params: &GenerateParams<'_, B::Buffer>,
    ) -> SortResult<()> {
        let count = self.claim(params.count, "generate_batch")?;
        if count == 0 {
            return Ok(());
        }
        let Some(storage) = self.storage.as_ref() else {
            return Err(contract_violation("generate_batch without storage"));
        };

        let mut uniforms = params.uniforms(self.write_cursor);
        uniforms.count = count;
        let workgroups = count.div_ceil(self.backend.config().group_size);

        self.backend.submit(
            encoder,
            KernelBindings::GenKeys {
                uniforms,
                positions: params.positions,
                keys_out: &storage.keys[self.current],
                values_out: &storage.values[self.current],
            },
            workgroups,
        )?;

        self.advance(count);
        Ok(())
    }

    /// Host-side alternative to [`generate_batch`](Self::generate_batch) for
    /// precomputed keys. Only the low `key_bits` bits take part in the sort.
    pub fn upload_keys(&mut self, keys: &[u32], index_start: u32, index_step: u32) -> SortResult<()> {
        let requested = u32::try_from(keys.len()).unwrap_or(u32::MAX);
        let count = self.claim(requested, "upload_keys")?;
        if count == 0 {
            return Ok(());
        }
        let Some(storage) = self.storage.as_ref() else {
            return Err(contract_violation("upload_keys without storage"));
        };

        let values: Vec<u32> = (0..count)
            .map(|i| index_start.wrapping_add(i.wrapping_mul(index_step)))
            .collect();
        self.backend.write_buffer(
            &storage.keys[self.current],
            self.write_cursor,
            &keys[..count as usize],
        )?;
        self.backend
            .write_buffer(&storage.values[self.current], self.write_cursor, &values)?;

        self.advance(count);
        Ok(())
    }

    /// Record `key_bits` passes of up-sweep, group-scan and down-sweep
    pub fn sort(&mut self, encoder: &mut B::Encoder) -> SortResult<()> {
        match self.state {
            SorterState::Empty => return Err(contract_violation("sort before prepare")),
            SorterState::Sorted => return Err(contract_violation("sort called twice")),
            SorterState::Prepared => {
                return Err(contract_violation(format!(
                    "sort with {} of {} elements generated",
                    self.write_cursor, self.total_count
                )));
            }
            SorterState::Filled => {}
        }

        if let Some(storage) = self.storage.as_ref() {
            let key_bits = self.backend.config().key_bits;
            for bit in 0..key_bits {
                let uniforms = SweepUniforms::new(bit, self.group_count);
                let (src, dst) = (self.current, 1 - self.current);

                self.backend.submit(
                    encoder,
                    KernelBindings::UpSweep {
                        uniforms,
                        keys_in: &storage.keys[src],
                        cache: &storage.cache,
                    },
                    self.group_count,
                )?;
                self.backend.submit(
                    encoder,
                    KernelBindings::GroupScan {
                        uniforms,
                        cache: &storage.cache,
                    },
                    1,
                )?;
                self.backend.submit(
                    encoder,
                    KernelBindings::DownSweep {
                        uniforms,
                        cache: &storage.cache,
                        keys_in: &storage.keys[src],
                        values_in: &storage.values[src],
                        keys_out: &storage.keys[dst],
                        values_out: &storage.values[dst],
                    },
                    self.group_count,
                )?;

                self.current = dst;
            }
            log::debug!(
                "[Sorter] Recorded {} passes over {} elements",
                key_bits,
                self.total_count
            );
        }

        self.state = SorterState::Sorted;
        Ok(())
    }

    /// Sorted values once [`sort`](Self::sort) was recorded.
    ///
    /// Reading them is only meaningful after the encoder was flushed.
    pub fn sorted_values(&self) -> Option<SortedValues<'_, B::Buffer>> {
        if self.state != SorterState::Sorted {
            return None;
        }
        self.storage.as_ref().map(|storage| SortedValues {
            buffer: &*storage.values[self.current],
            len: self.total_count,
        })
    }

    /// Blocking readback of the first `N` sorted values
    pub fn read_sorted_values(&self) -> SortResult<Vec<u32>> {
        if self.state != SorterState::Sorted {
            return Err(contract_violation("read_sorted_values before sort"));
        }
        match self.sorted_values() {
            Some(view) => self.backend.read_buffer(view.buffer(), 0, view.len()),
            None => Ok(Vec::new()),
        }
    }

    /// Release storage back to the pool and reset
    pub fn clear(&mut self) {
        self.storage = None;
        self.state = SorterState::Empty;
        self.total_count = 0;
        self.aligned_count = 0;
        self.group_count = 0;
        self.write_cursor = 0;
        self.current = 0;
    }

    pub fn state(&self) -> SorterState {
        self.state
    }

    /// Element count of the current sort
    pub fn len(&self) -> u32 {
        self.total_count
    }

    pub fn is_empty(&self) -> bool {
        self.total_count == 0
    }

    pub fn aligned_count(&self) -> u32 {
        self.aligned_count
    }

    pub fn group_count(&self) -> u32 {
        self.group_count
    }

    pub fn write_cursor(&self) -> u32 {
        self.write_cursor
    }

    /// Index of the buffer pair holding the latest data
    pub fn current_buffer(&self) -> usize {
        self.current
    }

    /// `None` until `prepare` allocated storage
    pub fn storage_lens(&self) -> Option<StorageLens> {
        self.storage.as_ref().map(|storage| StorageLens {
            keys: [storage.keys[0].len(), storage.keys[1].len()],
            values: [storage.values[0].len(), storage.values[1].len()],
            cache: storage.cache.len(),
        })
    }
}
