//! Up-sweep: per-group count of zero bits

use rayon::prelude::*;

use super::scan::workgroup_exclusive_scan;
use crate::gpu::SweepUniforms;

/// 1 when bit `bit` of `key` is clear
#[inline]
pub fn zero_flag(key: u32, bit: u32) -> u32 {
    ((key >> bit) & 1) ^ 1
}

/// Reference up-sweep.
///
/// Group `g` scans the zero flags of `keys[g*G..(g+1)*G]` and stores the
/// scan total in `cache[g]`.
pub fn run(group_size: u32, uniforms: &SweepUniforms, keys: &[u32], cache: &mut [u32]) {
    let group_size = group_size as usize;
    let groups = (uniforms.group_count as usize)
        .min(cache.len())
        .min(keys.len() / group_size);

    cache[..groups]
        .par_iter_mut()
        .enumerate()
        .for_each_init(
            || vec![0u32; group_size],
            |flags, (g, slot)| {
                let group = &keys[g * group_size..(g + 1) * group_size];
                for (flag, &key) in flags.iter_mut().zip(group) {
                    *flag = zero_flag(key, uniforms.bit);
                }
                *slot = workgroup_exclusive_scan(flags);
            },
        );
}
