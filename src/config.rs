//! Storage configuration

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::file::BUFFER_POOL_SIZE;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Sizing of the file table and buffer pool. Missing fields take their
/// defaults when loaded from JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Number of page frames in the buffer pool
    pub buffer_pool_size: usize,
    /// Maximum number of simultaneously open files
    pub max_open_files: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            buffer_pool_size: BUFFER_POOL_SIZE,
            max_open_files: 128,
        }
    }
}

impl StorageConfig {
    /// Load a configuration from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save the configuration as JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.buffer_pool_size == 0 {
            return Err(ConfigError::Invalid(
                "buffer_pool_size must be at least 1".to_string(),
            ));
        }
        if self.max_open_files == 0 {
            return Err(ConfigError::Invalid(
                "max_open_files must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StorageConfig::default();
        assert_eq!(config.buffer_pool_size, BUFFER_POOL_SIZE);
        assert_eq!(config.max_open_files, 128);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("storage.json");

        let config = StorageConfig {
            buffer_pool_size: 64,
            max_open_files: 8,
        };
        config.save(&path).unwrap();

        let loaded = StorageConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("storage.json");
        fs::write(&path, r#"{ "buffer_pool_size": 16 }"#).unwrap();

        let loaded = StorageConfig::load(&path).unwrap();
        assert_eq!(loaded.buffer_pool_size, 16);
        assert_eq!(loaded.max_open_files, 128);
    }

    #[test]
    fn test_zero_sizes_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("storage.json");
        fs::write(&path, r#"{ "buffer_pool_size": 0 }"#).unwrap();

        let result = StorageConfig::load(&path);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_malformed_json() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("storage.json");
        fs::write(&path, "not json").unwrap();

        let result = StorageConfig::load(&path);
        assert!(matches!(result, Err(ConfigError::JsonError(_))));
    }
}
