//! Embedded shader sources
//!
//! Kernel and include files are embedded at compile time so no shader path
//! has to be resolved at runtime.

use super::backend::SortKernel;

/// Blelloch workgroup scan shared by the sweep kernels
pub const WORKGROUP_SCAN_WGSL: &str = include_str!("wgsl_includes/workgroup_scan.wgsl");

/// Sweep uniform block and bit helpers
pub const SWEEP_COMMON_WGSL: &str = include_str!("wgsl_includes/sweep_common.wgsl");

/// Depth key quantization
pub const DEPTH_KEY_WGSL: &str = include_str!("wgsl_includes/depth_key.wgsl");

pub const GEN_KEYS_WGSL: &str = include_str!("shaders/gen_keys.wgsl");
pub const UP_SWEEP_WGSL: &str = include_str!("shaders/up_sweep.wgsl");
pub const GROUP_SCAN_WGSL: &str = include_str!("shaders/group_scan.wgsl");
pub const DOWN_SWEEP_WGSL: &str = include_str!("shaders/down_sweep.wgsl");

/// Get shader include content by name
pub fn get_shader_include(name: &str) -> Option<&'static str> {
    match name {
        "workgroup_scan.wgsl" | "wgsl_includes/workgroup_scan.wgsl" => Some(WORKGROUP_SCAN_WGSL),
        "sweep_common.wgsl" | "wgsl_includes/sweep_common.wgsl" => Some(SWEEP_COMMON_WGSL),
        "depth_key.wgsl" | "wgsl_includes/depth_key.wgsl" => Some(DEPTH_KEY_WGSL),
        _ => None,
    }
}

/// Unprocessed source of one kernel
pub fn kernel_source(kernel: SortKernel) -> &'static str {
    match kernel {
        SortKernel::GenKeys => GEN_KEYS_WGSL,
        SortKernel::UpSweep => UP_SWEEP_WGSL,
        SortKernel::GroupScan => GROUP_SCAN_WGSL,
        SortKernel::DownSweep => DOWN_SWEEP_WGSL,
    }
}
