//! Configuration loading for FEEDVAULT.
//!
//! All fields are required in the TOML file. The `new` constructors carry the
//! defaults used when wiring components programmatically.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Default disk cache budget: 50 MB.
pub const DEFAULT_MAX_CACHE_SIZE_MB: u64 = 50;

/// Default quiet interval before a synced value is pushed to the remote store.
pub const DEFAULT_DEBOUNCE_MS: u64 = 1_000;

/// Default remote/local key for the seen-items set.
pub const DEFAULT_SEEN_ITEMS_KEY: &str = "seenItems";

/// Default remote/local key for the excluded-tags list.
pub const DEFAULT_EXCLUDED_TAGS_KEY: &str = "excludedTags";

/// Default LMDB map size for the local key/value store.
pub const DEFAULT_LOCAL_STORE_MAX_SIZE_MB: usize = 16;

const BYTES_PER_MB: u64 = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeedVaultConfig {
    pub disk_cache: DiskCacheConfig,
    pub sync: SyncConfig,
}

/// Disk cache location and size budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiskCacheConfig {
    pub directory: PathBuf,
    pub max_size_mb: u64,
}

/// Synchronized state settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    pub debounce_ms: u64,
    pub seen_items_key: String,
    pub excluded_tags_key: String,
    pub local_store_path: PathBuf,
    pub local_store_max_size_mb: usize,
}

impl DiskCacheConfig {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            max_size_mb: DEFAULT_MAX_CACHE_SIZE_MB,
        }
    }

    pub fn with_max_size_mb(mut self, max_size_mb: u64) -> Self {
        self.max_size_mb = max_size_mb;
        self
    }

    /// The size budget in bytes.
    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_mb.saturating_mul(BYTES_PER_MB)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.directory.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "disk_cache.directory",
                reason: "must not be empty".to_string(),
            });
        }
        if self.max_size_mb == 0 {
            return Err(ConfigError::InvalidValue {
                field: "disk_cache.max_size_mb",
                reason: "must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

impl SyncConfig {
    pub fn new(local_store_path: impl Into<PathBuf>) -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            seen_items_key: DEFAULT_SEEN_ITEMS_KEY.to_string(),
            excluded_tags_key: DEFAULT_EXCLUDED_TAGS_KEY.to_string(),
            local_store_path: local_store_path.into(),
            local_store_max_size_mb: DEFAULT_LOCAL_STORE_MAX_SIZE_MB,
        }
    }

    pub fn with_debounce_ms(mut self, debounce_ms: u64) -> Self {
        self.debounce_ms = debounce_ms;
        self
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.debounce_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "sync.debounce_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.seen_items_key.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "sync.seen_items_key",
                reason: "must not be empty".to_string(),
            });
        }
        if self.excluded_tags_key.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "sync.excluded_tags_key",
                reason: "must not be empty".to_string(),
            });
        }
        if self.seen_items_key == self.excluded_tags_key {
            return Err(ConfigError::InvalidValue {
                field: "sync.excluded_tags_key",
                reason: "must differ from seen_items_key".to_string(),
            });
        }
        if self.local_store_path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "sync.local_store_path",
                reason: "must not be empty".to_string(),
            });
        }
        if self.local_store_max_size_mb == 0 {
            return Err(ConfigError::InvalidValue {
                field: "sync.local_store_max_size_mb",
                reason: "must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

impl FeedVaultConfig {
    /// Build a configuration rooted at `base_dir` with default budgets.
    pub fn in_directory(base_dir: &Path) -> Self {
        Self {
            disk_cache: DiskCacheConfig::new(base_dir.join("pages")),
            sync: SyncConfig::new(base_dir.join("kv")),
        }
    }

    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path_from_args().or_else(config_path_from_env);
        let path = path.ok_or(ConfigError::MissingConfigPath)?;
        let config = Self::from_path(&path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: FeedVaultConfig = toml::from_str(contents)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.disk_cache.validate()?;
        self.sync.validate()?;
        if self.disk_cache.directory == self.sync.local_store_path {
            return Err(ConfigError::InvalidValue {
                field: "sync.local_store_path",
                reason: "must not share the disk cache directory".to_string(),
            });
        }
        Ok(())
    }
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var("FEEDVAULT_CONFIG").ok().map(PathBuf::from)
}

fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}
