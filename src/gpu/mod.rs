//! Compute backends for the sorter
//!
//! The [`ComputeBackend`] trait is the seam between the sort orchestration and
//! the device. [`WgpuBackend`] runs the WGSL kernels; [`CpuBackend`] runs the
//! same workgroup algorithms in Rust and serves as the reference.

pub mod backend;
pub mod cpu_backend;
pub mod preprocessor;
pub mod shader_includes;
pub mod wgpu_backend;

pub use backend::{ComputeBackend, GenKeysUniforms, KernelBindings, SortKernel, SweepUniforms};
pub use cpu_backend::{CpuBackend, CpuBuffer, CpuEncoder};
pub use preprocessor::{build_kernel_source, WgslPreprocessor};
pub use wgpu_backend::{GpuBuffer, WgpuBackend, WgpuEncoder};
