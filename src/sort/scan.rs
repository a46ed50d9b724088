//! Workgroup exclusive scan
//!
//! Rust rendition of the Blelloch tree scan the kernels run in workgroup
//! memory (`wgsl_includes/workgroup_scan.wgsl`). Each loop iteration below is
//! one barrier-separated step on the GPU, so both sides produce the same
//! partial sums in the same order.

/// In-place exclusive prefix sum of `data`, returning the total.
///
/// `data.len()` must be a power of two (a workgroup is). Sums wrap like
/// `u32` addition in WGSL.
pub fn workgroup_exclusive_scan(data: &mut [u32]) -> u32 {
    let n = data.len();
    if n == 0 {
        return 0;
    }
    debug_assert!(n.is_power_of_two(), "scan width {} is not a power of two", n);

    // Up-sweep (reduce)
    let mut offset = 1;
    while offset < n {
        let mut i = 2 * offset - 1;
        while i < n {
            data[i] = data[i].wrapping_add(data[i - offset]);
            i += 2 * offset;
        }
        offset *= 2;
    }

    let total = data[n - 1];
    data[n - 1] = 0;

    // Down-sweep
    let mut offset = n / 2;
    while offset > 0 {
        let mut i = 2 * offset - 1;
        while i < n {
            let left = data[i - offset];
            data[i - offset] = data[i];
            data[i] = data[i].wrapping_add(left);
            i += 2 * offset;
        }
        offset /= 2;
    }

    total
}
