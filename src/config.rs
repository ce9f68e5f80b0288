//! Server configuration.
//!
//! Per CONFIG.md: one JSON file, loaded once at startup, immutable
//! afterwards. Every tunable has a default so an empty object is a valid
//! configuration.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::broadcast::DEFAULT_LOOKUP_BATCH_CEILING;
use crate::delta::DEFAULT_STRING_COMPRESSION_MIN;
use crate::repl::ReplicationConfig;
use crate::txn::DEFAULT_WATERMARK_INTERVAL;

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Object store lock stripes.
    #[serde(default = "default_shard_count")]
    pub shard_count: usize,

    /// Commits between low-watermark recomputations.
    #[serde(default = "default_watermark_interval")]
    pub watermark_interval: u64,

    /// Byte length at or above which strings are compressed on the wire.
    #[serde(default = "default_string_compression_min")]
    pub string_compression_min: usize,

    /// Lookup identifiers carried in one broadcast message.
    #[serde(default = "default_lookup_batch_ceiling")]
    pub lookup_batch_ceiling: usize,

    #[serde(default)]
    pub replication: ReplicationConfig,
}

fn default_shard_count() -> usize {
    16
}

fn default_watermark_interval() -> u64 {
    DEFAULT_WATERMARK_INTERVAL
}

fn default_string_compression_min() -> usize {
    DEFAULT_STRING_COMPRESSION_MIN
}

fn default_lookup_batch_ceiling() -> usize {
    DEFAULT_LOOKUP_BATCH_CEILING
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            shard_count: default_shard_count(),
            watermark_interval: default_watermark_interval(),
            string_compression_min: default_string_compression_min(),
            lookup_batch_ceiling: default_lookup_batch_ceiling(),
            replication: ReplicationConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let raw = fs::read_to_string(path)?;
        let config: ServerConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.shard_count == 0 {
            return Err(ConfigError::Invalid("shard_count must be >= 1".into()));
        }
        if self.watermark_interval == 0 {
            return Err(ConfigError::Invalid(
                "watermark_interval must be >= 1".into(),
            ));
        }
        self.replication
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(())
    }
}
