//! Error types for FEEDVAULT operations

use std::path::PathBuf;
use thiserror::Error;

/// Disk cache errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Invalid cache key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("I/O failed on {path:?}: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("Serialization failed for key {key}: {reason}")]
    Serialization { key: String, reason: String },

    #[error("Corrupted cache entry for key {key}: {reason}")]
    Corrupted { key: String, reason: String },
}

impl CacheError {
    /// Build an [`CacheError::Io`] from a path and the underlying error.
    pub fn io(path: impl Into<PathBuf>, err: &std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            reason: err.to_string(),
        }
    }
}

/// Synchronization errors between the local and remote key/value stores.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("Remote store unavailable: {reason}")]
    RemoteUnavailable { reason: String },

    #[error("Remote store rejected the request: not authorized")]
    Unauthorized,

    #[error("Remote store quota exceeded while writing {key}")]
    QuotaExceeded { key: String },

    #[error("Failed to decode value for {key}: {reason}")]
    Decode { key: String, reason: String },

    #[error("Failed to encode value for {key}: {reason}")]
    Encode { key: String, reason: String },

    #[error("Local store failure: {reason}")]
    LocalStore { reason: String },
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing configuration file path (use --config or FEEDVAULT_CONFIG)")]
    MissingConfigPath,

    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Master error type for all FEEDVAULT errors.
#[derive(Debug, Error)]
pub enum FeedVaultError {
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for disk cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Result type alias for synchronization operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Result type alias for FEEDVAULT operations.
pub type FeedVaultResult<T> = Result<T, FeedVaultError>;

// =============================================================================
// TESTS
// =============================================================================
