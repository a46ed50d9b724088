//! Depth-sorted billboard batches
//!
//! A batch concatenates the particles of several draw requests into one
//! vertex range. When sorting is on, every particle contributes the index of
//! its first vertex, and the sorted list tells the billboarder in which order
//! to emit quads.

use std::sync::Arc;

use glam::Vec3;

use super::billboard::BillboardMode;
use crate::constants::sort::POSITION_STRIDE;
use crate::error::{SortError, SortResult};
use crate::gpu::ComputeBackend;
use crate::logging::LogOnce;
use crate::memory::BufferPool;
use crate::sort::{GenerateParams, SortedValues, Sorter};

/// Particles of one renderer sharing a billboard mode
#[derive(Debug, Clone, Copy)]
pub struct DrawRequest<'a, T> {
    pub particle_count: u32,
    pub mode: BillboardMode,
    /// Word buffer of packed xyz positions
    pub positions: &'a T,
    pub positions_offset: u32,
    pub positions_stride: u32,
}

impl<'a, T> DrawRequest<'a, T> {
    pub fn new(particle_count: u32, mode: BillboardMode, positions: &'a T) -> Self {
        Self {
            particle_count,
            mode,
            positions,
            positions_offset: 0,
            positions_stride: POSITION_STRIDE,
        }
    }
}

/// Where one draw request lands in the batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawRange {
    /// Index into the request slice
    pub request: usize,
    pub particle_count: u32,
    pub particles_offset: u32,
    pub vertices_offset: u32,
    pub indices_offset: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchLayout {
    pub ranges: Vec<DrawRange>,
    pub total_particles: u32,
    pub total_vertices: u32,
    pub total_indices: u32,
}

impl BatchLayout {
    /// Lay requests out back to back; empty requests take no space.
    ///
    /// Totals that overflow `u32` are [`SortError::CapacityExceeded`], with
    /// the particles laid out so far as the maximum.
    pub fn from_requests<T>(requests: &[DrawRequest<'_, T>]) -> SortResult<Self> {
        let mut layout = BatchLayout::default();
        for (request, dr) in requests.iter().enumerate() {
            if dr.particle_count == 0 {
                continue;
            }
            let count = dr.particle_count;
            let totals = (
                grow(layout.total_particles, count, 1),
                grow(layout.total_vertices, count, dr.mode.vertices_per_particle()),
                grow(layout.total_indices, count, dr.mode.indices_per_particle()),
            );
            let (Some(particles), Some(vertices), Some(indices)) = totals else {
                let requested = requests
                    .iter()
                    .fold(0u32, |sum, dr| sum.saturating_add(dr.particle_count));
                return Err(SortError::CapacityExceeded {
                    requested,
                    maximum: layout.total_particles,
                });
            };
            layout.ranges.push(DrawRange {
                request,
                particle_count: count,
                particles_offset: layout.total_particles,
                vertices_offset: layout.total_vertices,
                indices_offset: layout.total_indices,
            });
            layout.total_particles = particles;
            layout.total_vertices = vertices;
            layout.total_indices = indices;
        }
        Ok(layout)
    }
}

fn grow(total: u32, count: u32, per_particle: u32) -> Option<u32> {
    total.checked_add(count.checked_mul(per_particle)?)
}

/// Draw order handed to the billboarder
#[derive(Debug, Clone, Copy)]
pub enum SortedIndices<'a, T> {
    /// First-vertex indices, back to front per the sorter configuration
    Sorted(SortedValues<'a, T>),
    /// No sort this frame; draw in submission order
    Unsorted,
}

impl<T> SortedIndices<'_, T> {
    pub fn is_sorted(&self) -> bool {
        matches!(self, SortedIndices::Sorted(_))
    }
}

/// Render-batch side of the sorter: one per batch, reused every frame
pub struct BillboardSortBatch<B: ComputeBackend> {
    sorter: Sorter<B>,
    sort_enabled: bool,
    unsorted: LogOnce,
}

impl<B: ComputeBackend> BillboardSortBatch<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            sorter: Sorter::new(backend),
            sort_enabled: true,
            unsorted: LogOnce::new(),
        }
    }

    /// Materials without blending have no use for a sort
    pub fn set_sort_enabled(&mut self, enabled: bool) {
        self.sort_enabled = enabled;
    }

    pub fn sorter(&self) -> &Sorter<B> {
        &self.sorter
    }

    /// Lay out the batch and record the depth sort of all its particles.
    ///
    /// Pool exhaustion and oversized batches are not errors here: the batch
    /// falls back to [`SortedIndices::Unsorted`] and the layout stays valid.
    /// A batch whose vertex or index totals overflow `u32` has no layout and
    /// is returned as an error.
    pub fn build(
        &mut self,
        pool: &BufferPool<B>,
        encoder: &mut B::Encoder,
        requests: &[DrawRequest<'_, B::Buffer>],
        sort_origin: Vec3,
    ) -> SortResult<BatchLayout> {
        self.sorter.clear();
        let layout = BatchLayout::from_requests(requests)?;
        if !self.sort_enabled || layout.total_particles == 0 {
            return Ok(layout);
        }

        if let Err(e) = self.sorter.prepare(pool, layout.total_particles) {
            if !e.is_fallback() {
                return Err(e);
            }
            if self.unsorted.first() {
                log::warn!(
                    "[BillboardSortBatch] Drawing {} particles unsorted: {}",
                    layout.total_particles,
                    e
                );
            }
            return Ok(layout);
        }
        self.unsorted.reset();

        for range in &layout.ranges {
            let dr = &requests[range.request];
            let params = GenerateParams::new(range.particle_count, dr.positions)
                .with_indices(range.vertices_offset, dr.mode.vertices_per_particle())
                .with_sort_origin(sort_origin)
                .with_layout(dr.positions_offset, dr.positions_stride);
            self.sorter.generate_batch(encoder, &params)?;
        }
        self.sorter.sort(encoder)?;

        Ok(layout)
    }

    /// Order for this frame; valid once the encoder passed to
    /// [`build`](Self::build) was flushed
    pub fn sorted_indices(&self) -> SortedIndices<'_, B::Buffer> {
        match self.sorter.sorted_values() {
            Some(values) => SortedIndices::Sorted(values),
            None => SortedIndices::Unsorted,
        }
    }

    /// Blocking readback of the sorted indices, empty when unsorted
    pub fn read_sorted_indices(&self) -> SortResult<Vec<u32>> {
        match self.sorted_indices() {
            SortedIndices::Sorted(_) => self.sorter.read_sorted_values(),
            SortedIndices::Unsorted => Ok(Vec::new()),
        }
    }

    /// Hand the sort storage back to the pool
    pub fn end_frame(&mut self) {
        self.sorter.clear();
    }
}
