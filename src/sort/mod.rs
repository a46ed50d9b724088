//! Radix sort of particle depth keys
//!
//! [`Sorter`] records the kernels; the `keygen`, `up_sweep`, `group_scan` and
//! `down_sweep` modules hold the Rust reference of each kernel, which the CPU
//! backend executes and the WGSL kernels mirror.

pub mod down_sweep;
pub mod group_scan;
pub mod keygen;
pub mod scan;
pub mod sorter;
pub mod up_sweep;

pub use keygen::{depth_key, positions_to_words, sortable_float_bits, GenerateParams};
pub use scan::workgroup_exclusive_scan;
pub use sorter::{SortedValues, Sorter, SorterState, StorageLens};
