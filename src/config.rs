//! Sorter configuration
//!
//! Everything that shapes the kernels (workgroup size, key width, depth
//! quantization) lives here and is validated once, before any pipeline is
//! built. Settings can be loaded from TOML:
//!
//! ```toml
//! [sorter]
//! group_size = 256
//! key_bits = 16
//! direction = "back_to_front"
//!
//! [sorter.quantization]
//! mode = "linear"
//! max_distance = 250.0
//!
//! [pool]
//! max_bytes = 67108864
//! strategy = "best_fit"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::sort::{
    DEFAULT_GROUP_SIZE, DEFAULT_KEY_BITS, DEFAULT_MAX_SCAN_CHUNKS, MAX_GROUP_SIZE, MAX_KEY_BITS,
    MIN_GROUP_SIZE,
};
use crate::error::{SortError, SortResult};
use crate::memory::PoolConfig;

/// How a view distance becomes a `key_bits` wide key.
///
/// Distinct depths can collapse into one key under either mode. Equal keys
/// keep their generation order, nothing more.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum KeyQuantization {
    /// `key_bits` bits of the order-preserving float encoding, below the
    /// sign bit. Relative precision, no range to tune.
    #[default]
    FloatBits,
    /// Uniform steps over `[0, max_distance]`, clamped beyond.
    Linear { max_distance: f32 },
}

/// Order of the sorted values relative to the sort origin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    /// Farthest first, for alpha blending
    #[default]
    BackToFront,
    /// Nearest first
    FrontToBack,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SorterConfig {
    /// Threads per workgroup for every kernel; power of two
    pub group_size: u32,

    /// Key bits sorted, one up-sweep/scan/down-sweep pass per bit
    pub key_bits: u32,

    pub direction: SortDirection,

    /// Chunks of `group_size` per-group counts the single scan workgroup
    /// walks. Caps the element count at `group_size² * max_scan_chunks`.
    pub max_scan_chunks: u32,

    /// Kept last: it serializes as a TOML table
    pub quantization: KeyQuantization,
}

impl Default for SorterConfig {
    fn default() -> Self {
        Self {
            group_size: DEFAULT_GROUP_SIZE,
            key_bits: DEFAULT_KEY_BITS,
            quantization: KeyQuantization::default(),
            direction: SortDirection::default(),
            max_scan_chunks: DEFAULT_MAX_SCAN_CHUNKS,
        }
    }
}

impl SorterConfig {
    pub fn validate(&self) -> SortResult<()> {
        if !self.group_size.is_power_of_two()
            || !(MIN_GROUP_SIZE..=MAX_GROUP_SIZE).contains(&self.group_size)
        {
            return Err(SortError::Config(format!(
                "group_size must be a power of two in {}..={}, got {}",
                MIN_GROUP_SIZE, MAX_GROUP_SIZE, self.group_size
            )));
        }
        if !(1..=MAX_KEY_BITS).contains(&self.key_bits) {
            return Err(SortError::Config(format!(
                "key_bits must be in 1..={}, got {}",
                MAX_KEY_BITS, self.key_bits
            )));
        }
        if let KeyQuantization::Linear { max_distance } = self.quantization {
            if !max_distance.is_finite() || max_distance <= 0.0 {
                return Err(SortError::Config(format!(
                    "linear quantization needs a finite positive max_distance, got {}",
                    max_distance
                )));
            }
        }
        if self.max_scan_chunks == 0 {
            return Err(SortError::Config("max_scan_chunks must be at least 1".into()));
        }
        if self.max_element_count() == 0 {
            return Err(SortError::Config(
                "group_size² * max_scan_chunks does not fit in 32 bits".into(),
            ));
        }
        Ok(())
    }

    /// Largest element count one sort accepts
    pub fn max_element_count(&self) -> u32 {
        self.group_size
            .checked_mul(self.group_size)
            .and_then(|per_chunk| per_chunk.checked_mul(self.max_scan_chunks))
            .unwrap_or(0)
    }
}

/// Complete settings file: sorter plus the buffer pool feeding it
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SortSettings {
    pub sorter: SorterConfig,
    pub pool: PoolConfig,
}

impl SortSettings {
    pub fn from_toml_str(source: &str) -> SortResult<Self> {
        let settings: SortSettings = toml::from_str(source)?;
        settings.sorter.validate()?;
        Ok(settings)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> SortResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        let settings = Self::from_toml_str(&source)?;
        log::info!("[Config] Loaded sort settings from {}", path.display());
        Ok(settings)
    }

    pub fn to_toml_string(&self) -> SortResult<String> {
        toml::to_string_pretty(self).map_err(|e| SortError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::AllocationStrategy;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = SorterConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.group_size, 256);
        assert_eq!(config.key_bits, 16);
        assert_eq!(config.max_element_count(), 256 * 256 * 16);
    }

    #[test]
    fn test_rejects_bad_group_size() {
        for group_size in [0, 1, 3, 100, 2048] {
            let config = SorterConfig { group_size, ..SorterConfig::default() };
            assert!(matches!(config.validate(), Err(SortError::Config(_))), "{}", group_size);
        }
    }

    #[test]
    fn test_rejects_bad_key_bits_and_distance() {
        let config = SorterConfig { key_bits: 0, ..SorterConfig::default() };
        assert!(config.validate().is_err());
        let config = SorterConfig { key_bits: 33, ..SorterConfig::default() };
        assert!(config.validate().is_err());
        let config = SorterConfig {
            quantization: KeyQuantization::Linear { max_distance: 0.0 },
            ..SorterConfig::default()
        };
        assert!(config.validate().is_err());
        let config = SorterConfig {
            quantization: KeyQuantization::Linear { max_distance: f32::INFINITY },
            ..SorterConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_partial_toml() {
        let settings = SortSettings::from_toml_str(
            r#"
            [sorter]
            key_bits = 20
            direction = "front_to_back"

            [sorter.quantization]
            mode = "linear"
            max_distance = 128.0

            [pool]
            strategy = "first_fit"
            "#,
        )
        .unwrap();
        assert_eq!(settings.sorter.key_bits, 20);
        assert_eq!(settings.sorter.group_size, 256);
        assert_eq!(settings.sorter.direction, SortDirection::FrontToBack);
        assert_eq!(
            settings.sorter.quantization,
            KeyQuantization::Linear { max_distance: 128.0 }
        );
        assert_eq!(settings.pool.strategy, AllocationStrategy::FirstFit);
    }

    #[test]
    fn test_invalid_toml_values_are_rejected() {
        let result = SortSettings::from_toml_str("[sorter]\ngroup_size = 300\n");
        assert!(matches!(result, Err(SortError::Config(_))));
        let result = SortSettings::from_toml_str("[sorter\n");
        assert!(matches!(result, Err(SortError::TomlParse(_))));
    }

    #[test]
    fn test_settings_file_round_trip() {
        let settings = SortSettings {
            sorter: SorterConfig {
                group_size: 128,
                quantization: KeyQuantization::Linear { max_distance: 64.0 },
                ..SorterConfig::default()
            },
            pool: PoolConfig::default(),
        };
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(settings.to_toml_string().unwrap().as_bytes()).unwrap();

        let loaded = SortSettings::from_file(file.path()).unwrap();
        assert_eq!(loaded, settings);
    }
}
