//! # Format Configuration
//!
//! Host-tunable settings for the MP4 format.

use serde::{Deserialize, Serialize};

/// Settings applied to every reader and writer created by a format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatsConfig {
    /// Allow the platform to use hardware codecs.
    ///
    /// Default: true.
    #[serde(default = "default_enable_hardware_transforms")]
    pub enable_hardware_transforms: bool,

    /// Quality option used when a host does not pick one (0-7).
    ///
    /// Default: 4 (96 kbps per channel).
    #[serde(default = "default_quality_index")]
    pub default_quality_index: i32,

    /// Treat input streams as network resources (slow seeks, blocking callbacks).
    ///
    /// Default: false.
    #[serde(default)]
    pub using_network: bool,

    /// Frames copied per block by `write_from_reader`.
    ///
    /// Default: 65536.
    #[serde(default = "default_block_size")]
    pub block_size: usize,
}

impl Default for FormatsConfig {
    fn default() -> Self {
        Self {
            enable_hardware_transforms: default_enable_hardware_transforms(),
            default_quality_index: default_quality_index(),
            using_network: false,
            block_size: default_block_size(),
        }
    }
}

impl FormatsConfig {
    pub fn with_hardware_transforms(mut self, enable: bool) -> Self {
        self.enable_hardware_transforms = enable;
        self
    }

    pub fn with_default_quality_index(mut self, index: i32) -> Self {
        self.default_quality_index = index;
        self
    }

    pub fn with_using_network(mut self, using_network: bool) -> Self {
        self.using_network = using_network;
        self
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if !(0..=7).contains(&self.default_quality_index) {
            return Err(format!(
                "default_quality_index must be between 0 and 7, got {}",
                self.default_quality_index
            ));
        }

        if self.block_size == 0 {
            return Err("block_size must be > 0".to_string());
        }

        Ok(())
    }
}

fn default_enable_hardware_transforms() -> bool {
    true
}

fn default_quality_index() -> i32 {
    4
}

fn default_block_size() -> usize {
    65536
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = FormatsConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.enable_hardware_transforms);
        assert_eq!(config.default_quality_index, 4);
        assert_eq!(config.block_size, 65536);
    }

    #[test]
    fn test_invalid_values() {
        assert!(FormatsConfig::default()
            .with_default_quality_index(8)
            .validate()
            .is_err());
        assert!(FormatsConfig::default().with_block_size(0).validate().is_err());
    }

    #[test]
    fn test_serde_defaults() {
        let config: FormatsConfig = serde_json::from_str(r#"{"using_network": true}"#).unwrap();
        assert!(config.using_network);
        assert!(config.enable_hardware_transforms);
        assert_eq!(config.default_quality_index, 4);
    }
}
