//! Sort constants - single source of truth for CPU and GPU code
//!
//! Kernel sources never hardcode these values. They receive them through the
//! header produced by [`generate_wgsl_constants`], so the Rust reference
//! kernels and the WGSL kernels always agree.

use crate::config::{KeyQuantization, SortDirection, SorterConfig};

/// Core sort constants
pub mod sort {
    /// Default workgroup size of every sort kernel
    pub const DEFAULT_GROUP_SIZE: u32 = 256;
    pub const MIN_GROUP_SIZE: u32 = 2;
    pub const MAX_GROUP_SIZE: u32 = 1024;

    /// Default number of key bits sorted (one pass per bit)
    pub const DEFAULT_KEY_BITS: u32 = 16;
    pub const MAX_KEY_BITS: u32 = 32;

    /// Default number of group-size chunks the single scan workgroup walks
    pub const DEFAULT_MAX_SCAN_CHUNKS: u32 = 16;

    /// Key and value written into the aligned padding tail
    pub const PADDING_KEY: u32 = u32::MAX;
    pub const PADDING_VALUE: u32 = u32::MAX;

    /// Default word stride between consecutive packed positions (xyz)
    pub const POSITION_STRIDE: u32 = 3;
}

/// Key quantization mode ids shared with WGSL
pub mod quantization {
    pub const FLOAT_BITS: u32 = 0;
    pub const LINEAR: u32 = 1;
}

/// Round `count` up to the next multiple of `align`.
#[inline]
pub const fn align_up(count: u32, align: u32) -> u32 {
    count.div_ceil(align) * align
}

/// Mask of the `key_bits` low bits.
#[inline]
pub const fn key_mask(key_bits: u32) -> u32 {
    u32::MAX >> (32 - key_bits)
}

/// Generate the WGSL constants header for one sorter configuration
pub fn generate_wgsl_constants(config: &SorterConfig) -> String {
    let (mode, max_distance) = match config.quantization {
        KeyQuantization::FloatBits => (quantization::FLOAT_BITS, 1.0),
        KeyQuantization::Linear { max_distance } => (quantization::LINEAR, max_distance),
    };
    let back_to_front = matches!(config.direction, SortDirection::BackToFront) as u32;

    format!(
        r#"// AUTO-GENERATED SORT CONSTANTS - DO NOT EDIT
// Generated from src/constants.rs

const GROUP_SIZE: u32 = {}u;
const KEY_BITS: u32 = {}u;
const KEY_MASK: u32 = {}u;
const QUANT_FLOAT_BITS: u32 = {}u;
const QUANT_LINEAR: u32 = {}u;
const QUANTIZATION: u32 = {}u;
const MAX_DISTANCE: f32 = {:?};
const BACK_TO_FRONT: u32 = {}u;
"#,
        config.group_size,
        config.key_bits,
        key_mask(config.key_bits),
        quantization::FLOAT_BITS,
        quantization::LINEAR,
        mode,
        max_distance,
        back_to_front,
    )
}
