//! Acceleration configuration

use std::path::{Path, PathBuf};

use serde::Deserialize;
use virgl_protocol::BLIT_LENGTH;

use crate::encoder::DEFAULT_CAPACITY;
use crate::error::{Error, Result};

/// Acceleration configuration
///
/// Every field is optional in the TOML form:
///
/// ```toml
/// device_path = "/dev/dri/card0"
/// virtual_width = 1920
/// virtual_height = 1080
/// framebuffer_id = 42
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AccelConfig {
    /// DRM node of the virtio-gpu device
    pub device_path: PathBuf,
    /// Primary framebuffer width
    pub virtual_width: u32,
    /// Primary framebuffer height
    pub virtual_height: u32,
    /// Command encoder buffer size in bytes
    pub encoder_capacity: usize,
    /// Largest pixmap width or height accepted
    pub max_pixmap_dimension: u32,
    /// Whether 8-bit pixmaps may live on the host
    pub a8_surfaces: bool,
    /// Framebuffer to send dirty rectangles for (0 disables them)
    pub framebuffer_id: u32,
}

impl Default for AccelConfig {
    fn default() -> Self {
        Self {
            device_path: PathBuf::from("/dev/dri/card0"),
            virtual_width: 1024,
            virtual_height: 768,
            encoder_capacity: DEFAULT_CAPACITY,
            max_pixmap_dimension: 32767,
            a8_surfaces: false,
            framebuffer_id: 0,
        }
    }
}

impl AccelConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.display().to_string(),
            source,
        })?;

        let config = Self::from_toml_str(&text)?;
        log::debug!("virgl: loaded configuration from {}: {:?}", path.display(), config);
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.virtual_width == 0 || self.virtual_height == 0 {
            return Err(Error::Config(format!(
                "virtual size {}x{} must be non-zero",
                self.virtual_width, self.virtual_height
            )));
        }

        let min = (BLIT_LENGTH as usize + 1) * 4;
        if self.encoder_capacity % 4 != 0 || self.encoder_capacity < min {
            return Err(Error::Config(format!(
                "encoder_capacity {} must be a multiple of 4 and at least {}",
                self.encoder_capacity, min
            )));
        }

        if self.max_pixmap_dimension == 0 {
            return Err(Error::Config("max_pixmap_dimension must be non-zero".into()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AccelConfig::default();
        assert_eq!(config.device_path, PathBuf::from("/dev/dri/card0"));
        assert_eq!((config.virtual_width, config.virtual_height), (1024, 768));
        assert_eq!(config.encoder_capacity, 16 * 1024);
        assert_eq!(config.max_pixmap_dimension, 32767);
        assert!(!config.a8_surfaces);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config = AccelConfig::from_toml_str(
            r#"
            virtual_width = 1920
            virtual_height = 1080
            a8_surfaces = true
            "#,
        )
        .unwrap();

        assert_eq!(config.virtual_width, 1920);
        assert!(config.a8_surfaces);
        assert_eq!(config.encoder_capacity, DEFAULT_CAPACITY);
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(AccelConfig::from_toml_str("").unwrap(), AccelConfig::default());
    }

    #[test]
    fn test_rejects_bad_capacity() {
        assert!(matches!(
            AccelConfig::from_toml_str("encoder_capacity = 1022"),
            Err(Error::Config(_))
        ));
        assert!(AccelConfig::from_toml_str("encoder_capacity = 8").is_err());
    }

    #[test]
    fn test_rejects_unknown_keys() {
        assert!(matches!(
            AccelConfig::from_toml_str("device = \"/dev/null\""),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            AccelConfig::load("/nonexistent/virgl.toml"),
            Err(Error::ConfigRead { .. })
        ));
    }
}
