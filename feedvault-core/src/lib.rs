//! FEEDVAULT Core - Record Types, Keys, Errors, Configuration
//!
//! Pure data structures shared by the storage layer and its callers.
//! This crate performs no I/O besides reading configuration files.

pub mod config;
pub mod error;
pub mod keys;
pub mod record;

pub use config::{
    DiskCacheConfig, FeedVaultConfig, SyncConfig, DEFAULT_DEBOUNCE_MS, DEFAULT_EXCLUDED_TAGS_KEY,
    DEFAULT_LOCAL_STORE_MAX_SIZE_MB, DEFAULT_MAX_CACHE_SIZE_MB, DEFAULT_SEEN_ITEMS_KEY,
};
pub use error::{
    CacheError, CacheResult, ConfigError, FeedVaultError, FeedVaultResult, SyncError, SyncResult,
};
pub use keys::FeedKind;
pub use record::{CacheableRecord, ContentFlags, FeedItem};

/// Timestamp type using UTC timezone.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
