//! Compute backend seam
//!
//! The sorter never talks to a graphics API directly. It records kernel
//! dispatches through [`ComputeBackend::submit`], naming the kernel and the
//! buffers it binds, and lets the backend decide how a dispatch executes.
//!
//! Binding model (same slot order in every backend and in the WGSL):
//!
//! | kernel       | 0        | 1         | 2        | 3         | 4        | 5          |
//! |--------------|----------|-----------|----------|-----------|----------|------------|
//! | `GenKeys`    | uniforms | positions | keys out | values out|          |            |
//! | `UpSweep`    | uniforms | keys in   | cache    |           |          |            |
//! | `GroupScan`  | uniforms | cache     |          |           |          |            |
//! | `DownSweep`  | uniforms | cache     | keys in  | values in | keys out | values out |
//!
//! Buffers are arrays of 32-bit words. Positions are packed `f32` triples
//! stored as their bit patterns.

use crate::config::SorterConfig;
use crate::error::SortResult;

/// Kernel identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortKernel {
    GenKeys,
    UpSweep,
    GroupScan,
    DownSweep,
}

impl SortKernel {
    pub const ALL: [SortKernel; 4] = [
        SortKernel::GenKeys,
        SortKernel::UpSweep,
        SortKernel::GroupScan,
        SortKernel::DownSweep,
    ];

    pub fn label(self) -> &'static str {
        match self {
            SortKernel::GenKeys => "Sort GenKeys",
            SortKernel::UpSweep => "Sort UpSweep",
            SortKernel::GroupScan => "Sort GroupScan",
            SortKernel::DownSweep => "Sort DownSweep",
        }
    }

    pub fn entry_point(self) -> &'static str {
        match self {
            SortKernel::GenKeys => "gen_keys",
            SortKernel::UpSweep => "up_sweep",
            SortKernel::GroupScan => "group_scan",
            SortKernel::DownSweep => "down_sweep",
        }
    }

    /// Index into per-kernel tables
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Per-dispatch parameters of the key generator
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GenKeysUniforms {
    pub sort_origin: [f32; 3],
    pub count: u32,
    pub index_start: u32,
    pub index_step: u32,
    pub input_offset: u32,
    pub output_offset: u32,
    pub positions_offset: u32,
    pub positions_stride: u32,
    pub _padding: [u32; 2],
}

/// Per-dispatch parameters of the up-sweep, group-scan and down-sweep
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SweepUniforms {
    pub bit: u32,
    pub group_count: u32,
    pub _padding: [u32; 2],
}

impl SweepUniforms {
    pub fn new(bit: u32, group_count: u32) -> Self {
        Self {
            bit,
            group_count,
            _padding: [0; 2],
        }
    }
}

/// One kernel plus the buffers bound to it for a dispatch
pub enum KernelBindings<'a, B> {
    GenKeys {
        uniforms: GenKeysUniforms,
        positions: &'a B,
        keys_out: &'a B,
        values_out: &'a B,
    },
    UpSweep {
        uniforms: SweepUniforms,
        keys_in: &'a B,
        cache: &'a B,
    },
    GroupScan {
        uniforms: SweepUniforms,
        cache: &'a B,
    },
    DownSweep {
        uniforms: SweepUniforms,
        cache: &'a B,
        keys_in: &'a B,
        values_in: &'a B,
        keys_out: &'a B,
        values_out: &'a B,
    },
}

impl<B> KernelBindings<'_, B> {
    pub fn kernel(&self) -> SortKernel {
        match self {
            KernelBindings::GenKeys { .. } => SortKernel::GenKeys,
            KernelBindings::UpSweep { .. } => SortKernel::UpSweep,
            KernelBindings::GroupScan { .. } => SortKernel::GroupScan,
            KernelBindings::DownSweep { .. } => SortKernel::DownSweep,
        }
    }

    /// Uniform block as raw bytes, in binding slot 0
    pub fn uniform_bytes(&self) -> &[u8] {
        match self {
            KernelBindings::GenKeys { uniforms, .. } => bytemuck::bytes_of(uniforms),
            KernelBindings::UpSweep { uniforms, .. }
            | KernelBindings::GroupScan { uniforms, .. }
            | KernelBindings::DownSweep { uniforms, .. } => bytemuck::bytes_of(uniforms),
        }
    }

    /// Storage buffers in binding order, starting at slot 1
    pub fn storage_buffers(&self) -> Vec<&B> {
        match self {
            KernelBindings::GenKeys {
                positions,
                keys_out,
                values_out,
                ..
            } => vec![*positions, *keys_out, *values_out],
            KernelBindings::UpSweep { keys_in, cache, .. } => vec![*keys_in, *cache],
            KernelBindings::GroupScan { cache, .. } => vec![*cache],
            KernelBindings::DownSweep {
                cache,
                keys_in,
                values_in,
                keys_out,
                values_out,
                ..
            } => vec![*cache, *keys_in, *values_in, *keys_out, *values_out],
        }
    }
}

/// Minimal compute API the sorter drives.
///
/// A backend is built for one [`SorterConfig`]; its kernels are specialised
/// for that configuration. Recording is single-threaded: an encoder belongs
/// to the thread that created it, and dispatches recorded into it execute in
/// order when it is flushed.
pub trait ComputeBackend: Send + Sync {
    type Buffer: Send + Sync;
    type Encoder;

    fn name(&self) -> &'static str;

    fn config(&self) -> &SorterConfig;

    /// Allocate a zero-initialised buffer of `len` words
    fn create_buffer(&self, label: &str, len: u32) -> SortResult<Self::Buffer>;

    /// Capacity in words
    fn buffer_len(&self, buffer: &Self::Buffer) -> u32;

    /// Host write of `data` at word `offset`
    fn write_buffer(&self, buffer: &Self::Buffer, offset: u32, data: &[u32]) -> SortResult<()>;

    /// Blocking host readback of `len` words at `offset`.
    ///
    /// Waits for all previously flushed work on the device.
    fn read_buffer(&self, buffer: &Self::Buffer, offset: u32, len: u32) -> SortResult<Vec<u32>>;

    fn create_encoder(&self, label: &str) -> Self::Encoder;

    /// Record one dispatch of `workgroups` groups
    fn submit(
        &self,
        encoder: &mut Self::Encoder,
        bindings: KernelBindings<'_, Self::Buffer>,
        workgroups: u32,
    ) -> SortResult<()>;

    /// Hand recorded work to the device
    fn flush(&self, encoder: Self::Encoder) -> SortResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_layouts_match_wgsl() {
        // WGSL uniform structs are 16-byte granular
        assert_eq!(std::mem::size_of::<GenKeysUniforms>(), 48);
        assert_eq!(std::mem::size_of::<SweepUniforms>(), 16);
    }

    #[test]
    fn test_bindings_report_kernel_and_slots() {
        let (a, b, c) = (1u8, 2u8, 3u8);
        let bindings = KernelBindings::GenKeys {
            uniforms: GenKeysUniforms::default(),
            positions: &a,
            keys_out: &b,
            values_out: &c,
        };
        assert_eq!(bindings.kernel(), SortKernel::GenKeys);
        assert_eq!(bindings.storage_buffers(), vec![&1, &2, &3]);
        assert_eq!(bindings.uniform_bytes().len(), 48);

        let bindings: KernelBindings<'_, u8> = KernelBindings::GroupScan {
            uniforms: SweepUniforms::new(3, 7),
            cache: &a,
        };
        assert_eq!(bindings.kernel(), SortKernel::GroupScan);
        assert_eq!(bindings.storage_buffers().len(), 1);
    }

    #[test]
    fn test_kernel_indices_are_dense() {
        for (i, kernel) in SortKernel::ALL.iter().enumerate() {
            assert_eq!(kernel.index(), i);
        }
    }
}
