//! Down-sweep: stable one-bit split
//!
//! Each group ranks its elements among same-bit elements with a workgroup
//! scan, then scatters them to
//!
//! ```text
//! base0 = cache[g]
//! base1 = cache[group_count] + g * G - cache[g]
//! dest  = bit == 0 ? base0 + rank0 : base1 + (t - rank0)
//! ```

use rayon::prelude::*;

use super::scan::workgroup_exclusive_scan;
use super::up_sweep::zero_flag;
use crate::gpu::SweepUniforms;

/// Destination slots of one group's elements
fn group_destinations(
    group_size: usize,
    uniforms: &SweepUniforms,
    cache: &[u32],
    g: usize,
    keys: &[u32],
    out: &mut [u32],
) {
    let zeros_before = cache[g];
    let base0 = zeros_before;
    let base1 = cache[uniforms.group_count as usize]
        .wrapping_add((g * group_size) as u32)
        .wrapping_sub(zeros_before);

    for (rank, &key) in out.iter_mut().zip(keys) {
        *rank = zero_flag(key, uniforms.bit);
    }
    workgroup_exclusive_scan(out);

    for (t, (dest, &key)) in out.iter_mut().zip(keys).enumerate() {
        let rank0 = *dest;
        *dest = if zero_flag(key, uniforms.bit) == 1 {
            base0.wrapping_add(rank0)
        } else {
            base1.wrapping_add(t as u32).wrapping_sub(rank0)
        };
    }
}

/// Reference down-sweep from `(keys_in, values_in)` into `(keys_out, values_out)`
pub fn run(
    group_size: u32,
    uniforms: &SweepUniforms,
    cache: &[u32],
    keys_in: &[u32],
    values_in: &[u32],
    keys_out: &mut [u32],
    values_out: &mut [u32],
) {
    let group_size = group_size as usize;
    if uniforms.group_count as usize >= cache.len() {
        log::error!(
            "[Sorter] Down-sweep cache holds {} slots, needs {}",
            cache.len(),
            uniforms.group_count as usize + 1
        );
        return;
    }
    let groups = (uniforms.group_count as usize)
        .min(keys_in.len() / group_size)
        .min(values_in.len() / group_size);
    let len = groups * group_size;

    let mut destinations = vec![0u32; len];
    destinations
        .par_chunks_mut(group_size)
        .enumerate()
        .for_each(|(g, out)| {
            let keys = &keys_in[g * group_size..(g + 1) * group_size];
            group_destinations(group_size, uniforms, cache, g, keys, out);
        });

    // Destinations are a permutation when the cache came from the same keys;
    // anything else is dropped like an out of bounds store on the GPU.
    for ((&dest, &key), &value) in destinations.iter().zip(keys_in).zip(values_in) {
        let dest = dest as usize;
        if let (Some(k), Some(v)) = (keys_out.get_mut(dest), values_out.get_mut(dest)) {
            *k = key;
            *v = value;
        }
    }
}
