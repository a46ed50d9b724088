//! GPU radix sort for depth-ordered particle billboards
//!
//! Particles blended back to front need their draw order sorted by view
//! distance every frame. This crate sorts them with an LSD one-bit-split
//! radix sort built from three compute kernels per key bit (up-sweep,
//! group-scan, down-sweep) plus a key generator, behind a small
//! [`ComputeBackend`](gpu::ComputeBackend) seam with a wgpu implementation
//! and a CPU reference.
//!
//! ```no_run
//! use std::sync::Arc;
//! use particle_sort::prelude::*;
//!
//! # fn main() -> SortResult<()> {
//! let backend = Arc::new(CpuBackend::new(SorterConfig::default())?);
//! let pool = BufferPool::new(Arc::clone(&backend), PoolConfig::default());
//! let mut sorter = Sorter::new(Arc::clone(&backend));
//!
//! let words = positions_to_words(&[Vec3::new(0.0, 0.0, 4.0), Vec3::new(0.0, 0.0, 9.0)]);
//! let positions = backend.create_buffer("positions", words.len() as u32)?;
//! backend.write_buffer(&positions, 0, &words)?;
//!
//! let mut encoder = backend.create_encoder("frame");
//! sorter.prepare(&pool, 2)?;
//! sorter.generate_batch(&mut encoder, &GenerateParams::new(2, &positions))?;
//! sorter.sort(&mut encoder)?;
//! backend.flush(encoder)?;
//!
//! assert_eq!(sorter.read_sorted_values()?, vec![1, 0]);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod gpu;
pub mod logging;
pub mod memory;
pub mod particles;
pub mod sort;

pub use config::{KeyQuantization, SortDirection, SortSettings, SorterConfig};
pub use error::{SortError, SortResult};
pub use gpu::{ComputeBackend, CpuBackend, WgpuBackend};
pub use memory::{AllocationStrategy, BufferPool, PoolConfig};
pub use particles::{BillboardMode, BillboardSortBatch, DrawRequest, SortedIndices};
pub use sort::{GenerateParams, SortedValues, Sorter, SorterState};

/// Common imports
pub mod prelude {
    pub use crate::config::{KeyQuantization, SortDirection, SortSettings, SorterConfig};
    pub use crate::error::{SortError, SortResult};
    pub use crate::gpu::{ComputeBackend, CpuBackend, WgpuBackend};
    pub use crate::memory::{AllocationStrategy, BufferPool, PoolConfig};
    pub use crate::particles::{BillboardMode, BillboardSortBatch, DrawRequest, SortedIndices};
    pub use crate::sort::{positions_to_words, GenerateParams, SortedValues, Sorter, SorterState};
    pub use glam::Vec3;
}
