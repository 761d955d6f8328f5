use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use miner_storage_core::engine::{
    DEFAULT_BUCKET_COUNT_LIMIT, DEFAULT_CAPACITY_GB, DEFAULT_PER_BUCKET_SIZE_LIMIT,
    DEFAULT_RETENTION_DAYS,
};
use miner_storage_core::ledger::gb_to_bytes;
use miner_storage_core::StorageLimits;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Exact content budget in bytes. Takes precedence over the GB hint.
    #[serde(default)]
    pub capacity_bytes: Option<u64>,
    #[serde(default = "default_size_gb_hint")]
    pub max_database_size_gb_hint: u64,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    #[serde(default = "default_bucket_count_limit")]
    pub bucket_count_limit: usize,
    #[serde(default = "default_per_bucket_size_limit")]
    pub per_bucket_size_limit: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            capacity_bytes: None,
            max_database_size_gb_hint: DEFAULT_CAPACITY_GB,
            retention_days: DEFAULT_RETENTION_DAYS,
            bucket_count_limit: DEFAULT_BUCKET_COUNT_LIMIT,
            per_bucket_size_limit: DEFAULT_PER_BUCKET_SIZE_LIMIT,
        }
    }
}

fn default_size_gb_hint() -> u64 {
    DEFAULT_CAPACITY_GB
}
fn default_retention_days() -> u32 {
    DEFAULT_RETENTION_DAYS
}
fn default_bucket_count_limit() -> usize {
    DEFAULT_BUCKET_COUNT_LIMIT
}
fn default_per_bucket_size_limit() -> u64 {
    DEFAULT_PER_BUCKET_SIZE_LIMIT
}

impl StorageConfig {
    pub fn capacity_bytes(&self) -> u64 {
        self.capacity_bytes
            .unwrap_or_else(|| gb_to_bytes(self.max_database_size_gb_hint))
    }

    pub fn limits(&self) -> StorageLimits {
        StorageLimits {
            capacity_bytes: self.capacity_bytes(),
            retention_days: self.retention_days,
            bucket_count_limit: self.bucket_count_limit,
            per_bucket_size_limit: self.per_bucket_size_limit,
        }
    }
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.db.max_connections == 0 {
        anyhow::bail!("db.max_connections must be >= 1");
    }
    config.storage.limits().validate()?;

    Ok(config)
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}
