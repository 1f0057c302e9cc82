//! Configuration constants and types for a block space.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default block size (4KB, common for most file systems).
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Default number of blocks in the pool (16 MiB with default blocks).
pub const DEFAULT_BLOCK_COUNT: usize = 4096;

/// Default size of the scratch chunk used by channels for transfers and zero fill.
pub const DEFAULT_SCRATCH_SIZE: usize = 8192;

/// Smallest accepted block size.
pub const MIN_BLOCK_SIZE: usize = 16;

/// Configuration for a space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpaceConfig {
    /// Size of each block in bytes.
    pub block_size: usize,

    /// Number of blocks in the pool.
    pub block_count: usize,

    /// Chunk size for channel transfers.
    pub scratch_size: usize,
}

impl Default for SpaceConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            block_count: DEFAULT_BLOCK_COUNT,
            scratch_size: DEFAULT_SCRATCH_SIZE,
        }
    }
}

impl SpaceConfig {
    /// Create a configuration with the default scratch size.
    pub fn new(block_size: usize, block_count: usize) -> Self {
        Self {
            block_size,
            block_count,
            scratch_size: DEFAULT_SCRATCH_SIZE,
        }
    }

    /// Total pool capacity in bytes.
    pub fn capacity(&self) -> u64 {
        self.block_size as u64 * self.block_count as u64
    }

    /// Validate the configuration.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.block_size < MIN_BLOCK_SIZE || !self.block_size.is_power_of_two() {
            return Err(format!(
                "Block size must be a power of 2 and at least {}",
                MIN_BLOCK_SIZE
            ));
        }
        if self.block_count == 0 {
            return Err("Block count must be greater than 0".to_string());
        }
        if self.scratch_size == 0 {
            return Err("Scratch size must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Load a configuration from a JSON file. Missing fields take defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SpaceConfig = serde_json::from_str(&content)?;
        config.validate().map_err(Error::InvalidConfig)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = SpaceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.capacity(), 4096 * 4096);
    }

    #[test]
    fn test_validate_rejects_bad_block_size() {
        assert!(SpaceConfig::new(1000, 4).validate().is_err());
        assert!(SpaceConfig::new(8, 4).validate().is_err());
        assert!(SpaceConfig::new(4096, 0).validate().is_err());
    }

    #[test]
    fn test_load_partial_json() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("space.json");
        std::fs::write(&path, r#"{ "block_count": 3 }"#).unwrap();

        let config = SpaceConfig::load(&path).unwrap();
        assert_eq!(config.block_count, 3);
        assert_eq!(config.block_size, DEFAULT_BLOCK_SIZE);
    }

    #[test]
    fn test_load_invalid() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("space.json");
        std::fs::write(&path, r#"{ "block_size": 100 }"#).unwrap();
        assert!(matches!(
            SpaceConfig::load(&path),
            Err(Error::InvalidConfig(_))
        ));

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            SpaceConfig::load(&path),
            Err(Error::Serialization(_))
        ));
    }
}
