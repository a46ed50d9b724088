//! Group-scan: exclusive prefix sum over the per-group counts
//!
//! Runs as a single workgroup. It walks the counts in `group_size` chunks and
//! carries the running total from chunk to chunk, which is what bounds the
//! sortable element count by `max_scan_chunks`.

use super::scan::workgroup_exclusive_scan;
use crate::gpu::SweepUniforms;

/// Reference group-scan.
///
/// Afterwards `cache[g]` holds the zero count of all groups before `g`, and
/// `cache[group_count]` the zero count of the whole sort.
pub fn run(group_size: u32, uniforms: &SweepUniforms, cache: &mut [u32]) {
    let group_size = group_size as usize;
    let group_count = uniforms.group_count as usize;
    if group_count >= cache.len() {
        log::error!(
            "[Sorter] Group-scan cache holds {} slots, needs {}",
            cache.len(),
            group_count + 1
        );
        return;
    }

    let mut chunk = vec![0u32; group_size];
    let mut carry = 0u32;
    for start in (0..group_count).step_by(group_size) {
        let len = group_size.min(group_count - start);
        chunk[..len].copy_from_slice(&cache[start..start + len]);
        chunk[len..].fill(0);

        let total = workgroup_exclusive_scan(&mut chunk);
        for (slot, &prefix) in cache[start..start + len].iter_mut().zip(&chunk) {
            *slot = prefix.wrapping_add(carry);
        }
        carry = carry.wrapping_add(total);
    }
    cache[group_count] = carry;
}
