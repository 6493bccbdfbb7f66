//! Configuration types shared across crates.
//!
//! The CLI layers these over a TOML file and `GRANARY_`-prefixed environment
//! variables; every field has a serde default so a missing config file is
//! fine.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Where the metadata database lives.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

/// On-disk package cache configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Root directory artifacts are materialized under.
    #[serde(default = "default_cache_root")]
    pub root: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: default_cache_root(),
        }
    }
}

/// Registry synchronisation configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Seconds between periodic sync runs. The next run starts this long
    /// after the previous one finished, so runs never overlap.
    #[serde(default = "default_sync_interval_secs")]
    pub interval_secs: u64,
    /// Concurrent artifact downloads per registry. Defaults to twice the
    /// number of available CPUs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent_downloads: Option<usize>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sync_interval_secs(),
            max_concurrent_downloads: None,
        }
    }
}

impl SyncConfig {
    /// The interval as a [`Duration`].
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// The effective download concurrency.
    pub fn download_concurrency(&self) -> usize {
        self.max_concurrent_downloads
            .unwrap_or_else(default_download_concurrency)
    }
}

fn default_database_path() -> PathBuf {
    PathBuf::from("granary.sqlite3")
}

fn default_cache_root() -> PathBuf {
    PathBuf::from("cache")
}

fn default_sync_interval_secs() -> u64 {
    3600
}

/// Twice the available CPU count, with a floor of two workers.
pub fn default_download_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get() * 2)
        .unwrap_or(2)
}
