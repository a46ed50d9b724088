//! Key generator
//!
//! Turns particle positions into depth keys and seeds the value array with
//! draw indices. The WGSL kernel (`shaders/sort/gen_keys.wgsl`) and
//! [`run`] below share [`sortable_float_bits`] and [`depth_key`] bit for bit.

use glam::Vec3;
use rayon::prelude::*;

use crate::config::{KeyQuantization, SortDirection, SorterConfig};
use crate::constants::{key_mask, sort::POSITION_STRIDE};
use crate::gpu::GenKeysUniforms;

/// Order-preserving map from `f32` to `u32`.
///
/// Negative values get every bit flipped, positive values only the sign bit,
/// so unsigned comparison of the results matches float comparison.
#[inline]
pub fn sortable_float_bits(value: f32) -> u32 {
    let bits = value.to_bits();
    if bits & 0x8000_0000 != 0 {
        !bits
    } else {
        bits | 0x8000_0000
    }
}

/// Top `key_bits` below the sign bit, which is set for every non-negative
/// distance. Relative precision is about 2^-(key_bits-8).
#[inline]
fn float_bits_key(distance: f32, key_bits: u32) -> u32 {
    let bits = sortable_float_bits(distance);
    // Negative distances, -0.0 included, clamp to zero
    if bits & 0x8000_0000 == 0 {
        return 0;
    }
    (bits << 1) >> (32 - key_bits)
}

/// Quantize a view distance into a `key_bits` wide key
pub fn depth_key(config: &SorterConfig, distance: f32) -> u32 {
    let key_max = key_mask(config.key_bits);
    let quantized = match config.quantization {
        KeyQuantization::FloatBits => float_bits_key(distance, config.key_bits),
        KeyQuantization::Linear { max_distance } => {
            let t = (distance / max_distance).clamp(0.0, 1.0);
            // NaN saturates to 0 in the cast
            ((t * key_max as f32 + 0.5).floor() as u32).min(key_max)
        }
    };
    match config.direction {
        SortDirection::BackToFront => key_max - quantized,
        SortDirection::FrontToBack => quantized,
    }
}

/// One `generate_batch` call: a contiguous run of particles and where their
/// draw indices start.
#[derive(Debug, Clone, Copy)]
pub struct GenerateParams<'a, B> {
    /// Particles in this batch; zero is a no-op
    pub count: u32,
    /// Value written for the first particle
    pub index_start: u32,
    /// Value increment between consecutive particles
    pub index_step: u32,
    /// First particle read from `positions`
    pub input_offset: u32,
    pub sort_origin: Vec3,
    /// Word buffer of packed `f32` xyz
    pub positions: &'a B,
    /// Word offset of particle 0 in `positions`
    pub positions_offset: u32,
    /// Words between consecutive particles
    pub positions_stride: u32,
}

impl<'a, B> GenerateParams<'a, B> {
    pub fn new(count: u32, positions: &'a B) -> Self {
        Self {
            count,
            index_start: 0,
            index_step: 1,
            input_offset: 0,
            sort_origin: Vec3::ZERO,
            positions,
            positions_offset: 0,
            positions_stride: POSITION_STRIDE,
        }
    }

    pub fn with_indices(mut self, index_start: u32, index_step: u32) -> Self {
        self.index_start = index_start;
        self.index_step = index_step;
        self
    }

    pub fn with_input_offset(mut self, input_offset: u32) -> Self {
        self.input_offset = input_offset;
        self
    }

    pub fn with_sort_origin(mut self, sort_origin: Vec3) -> Self {
        self.sort_origin = sort_origin;
        self
    }

    pub fn with_layout(mut self, positions_offset: u32, positions_stride: u32) -> Self {
        self.positions_offset = positions_offset;
        self.positions_stride = positions_stride;
        self
    }

    /// Uniform block for a batch written at `output_offset`
    pub(crate) fn uniforms(&self, output_offset: u32) -> GenKeysUniforms {
        GenKeysUniforms {
            sort_origin: self.sort_origin.to_array(),
            count: self.count,
            index_start: self.index_start,
            index_step: self.index_step,
            input_offset: self.input_offset,
            output_offset,
            positions_offset: self.positions_offset,
            positions_stride: self.positions_stride,
            _padding: [0; 2],
        }
    }
}

/// Pack positions into the word layout the key generator reads
pub fn positions_to_words(positions: &[Vec3]) -> Vec<u32> {
    positions
        .iter()
        .flat_map(|p| [p.x.to_bits(), p.y.to_bits(), p.z.to_bits()])
        .collect()
}

fn read_position(positions: &[u32], uniforms: &GenKeysUniforms, i: u32) -> Vec3 {
    let base = uniforms.positions_offset as usize
        + (uniforms.input_offset as usize + i as usize) * uniforms.positions_stride as usize;
    // Out of range reads yield zero, like robust buffer access
    let word = |k: usize| positions.get(base + k).copied().map(f32::from_bits).unwrap_or(0.0);
    Vec3::new(word(0), word(1), word(2))
}

/// Reference key generation over `workgroups` groups
pub fn run(
    config: &SorterConfig,
    uniforms: &GenKeysUniforms,
    workgroups: u32,
    positions: &[u32],
    keys_out: &mut [u32],
    values_out: &mut [u32],
) {
    let threads = workgroups as usize * config.group_size as usize;
    let count = (uniforms.count as usize).min(threads);
    let start = uniforms.output_offset as usize;
    let end = (start + count).min(keys_out.len()).min(values_out.len());
    if start >= end {
        return;
    }

    let origin = Vec3::from_array(uniforms.sort_origin);
    keys_out[start..end]
        .par_iter_mut()
        .zip(values_out[start..end].par_iter_mut())
        .enumerate()
        .for_each(|(i, (key, value))| {
            let i = i as u32;
            let position = read_position(positions, uniforms, i);
            *key = depth_key(config, position.distance(origin));
            *value = uniforms
                .index_start
                .wrapping_add(i.wrapping_mul(uniforms.index_step));
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear(max_distance: f32, direction: SortDirection) -> SorterConfig {
        SorterConfig {
            quantization: KeyQuantization::Linear { max_distance },
            direction,
            ..SorterConfig::default()
        }
    }

    #[test]
    fn test_sortable_float_bits_preserves_order() {
        let values = [-1e30f32, -2.5, -1.0, -0.0, 0.0, 1e-30, 0.5, 1.0, 3.0, 1e30];
        for pair in values.windows(2) {
            assert!(
                sortable_float_bits(pair[0]) <= sortable_float_bits(pair[1]),
                "{} vs {}",
                pair[0],
                pair[1]
            );
        }
        assert_eq!(sortable_float_bits(0.0), 0x8000_0000);
    }

    #[test]
    fn test_linear_keys_clamp_and_round() {
        let config = linear(100.0, SortDirection::FrontToBack);
        assert_eq!(depth_key(&config, 0.0), 0);
        assert_eq!(depth_key(&config, -5.0), 0);
        assert_eq!(depth_key(&config, 100.0), 0xFFFF);
        assert_eq!(depth_key(&config, 1000.0), 0xFFFF);
        assert_eq!(depth_key(&config, 50.0), 32768);
        assert_eq!(depth_key(&config, f32::NAN), 0);
    }

    #[test]
    fn test_back_to_front_inverts_keys() {
        let config = linear(100.0, SortDirection::BackToFront);
        assert_eq!(depth_key(&config, 0.0), 0xFFFF);
        assert_eq!(depth_key(&config, 100.0), 0);
        assert!(depth_key(&config, 80.0) < depth_key(&config, 20.0));

        let config = SorterConfig::default();
        assert!(depth_key(&config, 80.0) < depth_key(&config, 20.0));
    }

    #[test]
    fn test_float_bits_keys_fit_key_width() {
        let config = SorterConfig {
            key_bits: 10,
            direction: SortDirection::FrontToBack,
            ..SorterConfig::default()
        };
        for distance in [0.0f32, 0.001, 1.0, 1e6, f32::MAX] {
            assert!(depth_key(&config, distance) <= key_mask(10));
        }
        assert!(depth_key(&config, 1.0) < depth_key(&config, 4.0));
    }

    #[test]
    fn test_float_bits_keys_use_every_bit() {
        let config = SorterConfig {
            direction: SortDirection::FrontToBack,
            ..SorterConfig::default()
        };
        // Exponent in the top 8 bits, 8 mantissa bits below
        assert_eq!(depth_key(&config, 1.0), 0x7F00);
        assert_eq!(depth_key(&config, 1.0 + 1.0 / 256.0), 0x7F01);
        assert_eq!(depth_key(&config, 2.0), 0x8000);
        assert_eq!(depth_key(&config, 0.0), 0);
        assert_eq!(depth_key(&config, -0.0), 0);
        assert_eq!(depth_key(&config, -3.0), 0);
        assert!(depth_key(&config, f32::INFINITY) > depth_key(&config, f32::MAX));
    }

    #[test]
    fn test_run_writes_keys_and_indices_at_offset() {
        let config = linear(10.0, SortDirection::FrontToBack);
        let positions = positions_to_words(&[
            Vec3::new(9.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 5.0, 0.0),
        ]);
        let params = GenerateParams::new(2, &()).with_indices(100, 4).with_input_offset(1);
        let uniforms = params.uniforms(3);

        let mut keys = vec![7u32; 6];
        let mut values = vec![7u32; 6];
        run(&config, &uniforms, 1, &positions, &mut keys, &mut values);

        assert_eq!(&keys[..3], &[7, 7, 7]);
        assert_eq!(keys[3], depth_key(&config, 1.0));
        assert_eq!(keys[4], depth_key(&config, 5.0));
        assert_eq!(keys[5], 7);
        assert_eq!(&values[3..5], &[100, 104]);
    }

    #[test]
    fn test_run_honours_layout_and_origin() {
        let config = linear(10.0, SortDirection::FrontToBack);
        // Two header words, then xyz plus one padding word per particle
        let words: Vec<u32> = [0.0f32, 0.0, 3.0, 4.0, 0.0, 0.0, 1.0, 1.0, 1.0, 0.0]
            .iter()
            .map(|f| f.to_bits())
            .collect();
        let params = GenerateParams::new(2, &())
            .with_layout(2, 4)
            .with_sort_origin(Vec3::new(1.0, 1.0, 1.0));
        let mut keys = vec![0u32; 2];
        let mut values = vec![0u32; 2];
        run(&config, &params.uniforms(0), 1, &words, &mut keys, &mut values);

        let first = Vec3::new(3.0, 4.0, 0.0).distance(Vec3::ONE);
        assert_eq!(keys[0], depth_key(&config, first));
        assert_eq!(keys[1], depth_key(&config, 0.0));
        assert_eq!(values, vec![0, 1]);
    }
}
