//! Configuration for the vote ledger

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Per-account checkpoint capacity (initial value; persisted state wins
    /// once any unit has been minted)
    pub ring_capacity: u32,

    /// Maximum units per batch call (initial value; persisted state wins)
    pub batch_limit: usize,

    /// Fuel budget handed to the mint observer per invocation
    pub observer_stipend: u64,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/votes"),
            service_name: "votes-core".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            ring_capacity: 1000,
            batch_limit: 100,
            observer_stipend: 50_000,
            rocksdb: RocksDBConfig::default(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Target file size (MB)
    pub target_file_size_mb: u64,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 4,
            target_file_size_mb: 64,
            max_background_jobs: 2,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("VOTES_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(capacity) = std::env::var("VOTES_RING_CAPACITY") {
            config.ring_capacity = capacity
                .parse()
                .map_err(|e| crate::Error::Config(format!("bad VOTES_RING_CAPACITY: {}", e)))?;
        }

        if let Ok(limit) = std::env::var("VOTES_BATCH_LIMIT") {
            config.batch_limit = limit
                .parse()
                .map_err(|e| crate::Error::Config(format!("bad VOTES_BATCH_LIMIT: {}", e)))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot honor
    pub fn validate(&self) -> crate::Result<()> {
        if self.ring_capacity == 0 {
            return Err(crate::Error::Config(
                "ring_capacity must be at least 1".to_string(),
            ));
        }
        if self.batch_limit == 0 {
            return Err(crate::Error::Config(
                "batch_limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
