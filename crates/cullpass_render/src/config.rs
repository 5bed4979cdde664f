//! # Cull Configuration
//!
//! Tunables for the cull pass, loaded once at startup from TOML.
//!
//! ```toml
//! hardware_point_sprites = false
//! show_vertex_animation = true
//! flash_rate = 2.0
//! unit_pool_reserve = 4096
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Errors from loading a [`CullConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The TOML did not parse or had unknown keys.
    #[error("invalid config syntax: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value parsed but is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Cull-pass configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CullConfig {
    /// Let the device render perspective-sized points and point sprites
    /// itself. When false those features are always expanded on the CPU.
    pub hardware_point_sprites: bool,
    /// Flash animated vertex data with the CPU or hardware flash state.
    pub show_vertex_animation: bool,
    /// Flash state changes per second of frame time.
    pub flash_rate: f64,
    /// Draw-unit blocks to pre-allocate in each cull thread's pool.
    pub unit_pool_reserve: usize,
}

impl Default for CullConfig {
    fn default() -> Self {
        Self {
            hardware_point_sprites: true,
            show_vertex_animation: false,
            flash_rate: 1.0,
            unit_pool_reserve: 0,
        }
    }
}

impl CullConfig {
    /// Parses and validates a TOML document. Missing keys take defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed TOML or unknown keys and
    /// [`ConfigError::Invalid`] on out-of-range values.
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// As [`Self::from_toml_str`], plus [`ConfigError::Io`] if the file
    /// cannot be read.
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `flash_rate` is not a positive
    /// finite number.
    pub fn validate(&self) -> ConfigResult<()> {
        if !(self.flash_rate.is_finite() && self.flash_rate > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "flash_rate must be positive and finite, got {}",
                self.flash_rate
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CullConfig::from_toml_str("").unwrap();
        assert_eq!(config, CullConfig::default());
        assert!(config.hardware_point_sprites);
    }

    #[test]
    fn test_partial_override() {
        let config = CullConfig::from_toml_str(
            "hardware_point_sprites = false\nunit_pool_reserve = 512\n",
        )
        .unwrap();
        assert!(!config.hardware_point_sprites);
        assert_eq!(config.unit_pool_reserve, 512);
        assert!((config.flash_rate - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = CullConfig::from_toml_str("point_sprites = true").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_invalid_flash_rate() {
        let err = CullConfig::from_toml_str("flash_rate = 0.0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = CullConfig::from_file("/nonexistent/cullpass.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
