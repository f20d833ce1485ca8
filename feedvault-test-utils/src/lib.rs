//! FEEDVAULT Test Utilities
//!
//! Centralized test infrastructure for the FEEDVAULT workspace:
//! - Proptest generators for records, cache keys and synced values
//! - A recording media cache
//! - Test fixtures for caches and sync harnesses
//! - Custom assertions for FEEDVAULT-specific validation

// Re-export core types for convenience
pub use feedvault_core::{
    CacheError, CacheResult, CacheableRecord, ContentFlags, DiskCacheConfig, FeedItem, FeedKind,
    FeedVaultConfig, FeedVaultError, FeedVaultResult, SyncConfig, SyncError, SyncResult,
    Timestamp,
};
pub use feedvault_storage::{
    CacheCoordinator, CacheMetrics, DiskCache, ExcludedTag, ExcludedTags, InMemoryKeyValueStore,
    InMemoryRemoteStore, MediaCache, SeenItems, SyncPhase, SyncStatus, SyncedStateStore,
    SyncedValue,
};

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;

// ============================================================================
// TRACING
// ============================================================================

/// Install a test subscriber honoring `RUST_LOG` (default `warn`).
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_test_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

// ============================================================================
// MOCK MEDIA CACHE
// ============================================================================

/// Media cache that reports a configurable footprint and counts clears.
#[derive(Debug, Default)]
pub struct RecordingMediaCache {
    usage: AtomicU64,
    clears: AtomicU64,
}

impl RecordingMediaCache {
    pub fn with_usage(bytes: u64) -> Self {
        Self {
            usage: AtomicU64::new(bytes),
            clears: AtomicU64::new(0),
        }
    }

    pub fn set_usage(&self, bytes: u64) {
        self.usage.store(bytes, Ordering::SeqCst);
    }

    /// Number of `clear_disk_cache` calls so far.
    pub fn clear_count(&self) -> u64 {
        self.clears.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaCache for RecordingMediaCache {
    async fn clear_disk_cache(&self) {
        self.clears.fetch_add(1, Ordering::SeqCst);
        self.usage.store(0, Ordering::SeqCst);
    }

    async fn disk_usage(&self) -> u64 {
        self.usage.load(Ordering::SeqCst)
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating FEEDVAULT types.

    use super::*;
    use proptest::prelude::*;

    /// Generate a Timestamp (DateTime<Utc>) between 2020 and 2030.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1577836800i64..1893456000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
        })
    }

    pub fn arb_content_flags() -> impl Strategy<Value = ContentFlags> {
        (1u8..32).prop_map(ContentFlags::from_bits_truncate)
    }

    pub fn arb_feed_kind() -> impl Strategy<Value = FeedKind> {
        prop_oneof![
            Just(FeedKind::New),
            Just(FeedKind::Promoted),
            Just(FeedKind::Junk),
        ]
    }

    /// Generate a FeedItem with realistic paths and dimensions.
    pub fn arb_feed_item() -> impl Strategy<Value = FeedItem> {
        (
            (
                1i64..10_000_000,
                0i64..1_000_000,
                "[a-zA-Z0-9_-]{2,24}",
                "[0-9]{4}/[0-9]{2}/[0-9]{2}/[a-z0-9]{8}\\.(jpg|png|mp4)",
                prop::option::of("full/[a-z0-9]{8}\\.png"),
            ),
            (
                1u32..4096,
                1u32..4096,
                any::<bool>(),
                arb_content_flags(),
                0i32..10_000,
                0i32..10_000,
                arb_timestamp(),
            ),
        )
            .prop_map(
                |((id, promoted, user, image, fullsize), (width, height, audio, flags, up, down, created))| {
                    FeedItem {
                        id,
                        promoted,
                        user,
                        thumb: format!("thumbs/{id}.jpg"),
                        image,
                        fullsize,
                        width,
                        height,
                        audio,
                        flags,
                        up,
                        down,
                        created,
                    }
                },
            )
    }

    /// Generate a page of up to `max_len` items.
    pub fn arb_feed_page(max_len: usize) -> impl Strategy<Value = Vec<FeedItem>> {
        prop::collection::vec(arb_feed_item(), 0..=max_len)
    }

    /// Generate a cache key mixing alphanumerics with separators.
    pub fn arb_cache_key() -> impl Strategy<Value = String> {
        "[a-z0-9]{1,8}([_ +/:.-][a-zA-Z0-9]{1,8}){0,4}"
    }

    pub fn arb_seen_items() -> impl Strategy<Value = SeenItems> {
        prop::collection::vec(0i64..500, 0..50).prop_map(SeenItems::from_iter)
    }

    pub fn arb_excluded_tag() -> impl Strategy<Value = ExcludedTag> {
        ("[a-z]{2,12}", any::<bool>()).prop_map(|(tag, enabled)| ExcludedTag { tag, enabled })
    }

    /// Generate a tag list without duplicates.
    pub fn arb_excluded_tags() -> impl Strategy<Value = ExcludedTags> {
        prop::collection::vec(arb_excluded_tag(), 0..8).prop_map(|tags| {
            let mut list = ExcludedTags::new();
            for tag in tags {
                if list.add(&tag.tag) {
                    list.set_enabled(&tag.tag, tag.enabled);
                }
            }
            list
        })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Ready-made values and harnesses for common scenarios.

    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    /// A plain SFW image item.
    pub fn feed_item(id: i64) -> FeedItem {
        FeedItem {
            id,
            promoted: 0,
            user: "tester".to_string(),
            image: format!("2024/03/03/{id}.jpg"),
            thumb: format!("2024/03/03/{id}_thumb.jpg"),
            fullsize: None,
            width: 1024,
            height: 768,
            audio: false,
            flags: ContentFlags::SFW,
            up: 10,
            down: 2,
            created: Utc::now(),
        }
    }

    /// `len` consecutive items starting at `first_id`.
    pub fn feed_page(first_id: i64, len: usize) -> Vec<FeedItem> {
        (first_id..).take(len).map(feed_item).collect()
    }

    /// A config rooted in a temp directory.
    pub fn temp_config() -> (FeedVaultConfig, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let config = FeedVaultConfig::in_directory(temp_dir.path());
        (config, temp_dir)
    }

    /// A disk cache in a temp directory with the given budget.
    pub fn temp_disk_cache(max_size_bytes: u64) -> (DiskCache, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let cache = DiskCache::with_budget(temp_dir.path().join("pages"), max_size_bytes)
            .expect("cache creation should succeed");
        (cache, temp_dir)
    }

    /// In-memory local and remote stores shared by any number of synced stores.
    #[derive(Debug, Default)]
    pub struct SyncHarness {
        pub local: Arc<InMemoryKeyValueStore>,
        pub remote: Arc<InMemoryRemoteStore>,
    }

    impl SyncHarness {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn store<T: SyncedValue>(&self, key: &str, debounce: Duration) -> SyncedStateStore<T> {
            SyncedStateStore::new(key, self.local.clone(), self.remote.clone(), debounce)
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Custom assertion functions for FEEDVAULT-specific validation.

    use super::*;

    /// Assert that a cache load returned records.
    #[track_caller]
    pub fn assert_cache_hit<R: std::fmt::Debug>(loaded: &Option<Vec<R>>) {
        assert!(loaded.is_some(), "Expected cache hit, got miss");
    }

    /// Assert that a cache load missed.
    #[track_caller]
    pub fn assert_cache_miss<R: std::fmt::Debug>(loaded: &Option<Vec<R>>) {
        assert!(loaded.is_none(), "Expected cache miss, got: {:?}", loaded);
    }

    /// Assert that two record sequences carry the same ids in the same order.
    #[track_caller]
    pub fn assert_same_ids<R: CacheableRecord>(actual: &[R], expected: &[R]) {
        let actual: Vec<i64> = actual.iter().map(CacheableRecord::record_id).collect();
        let expected: Vec<i64> = expected.iter().map(CacheableRecord::record_id).collect();
        assert_eq!(actual, expected, "Record ids differ");
    }

    /// Assert that the cache footprint respects its budget.
    #[track_caller]
    pub fn assert_within_budget(total_size: u64, budget: u64) {
        assert!(
            total_size <= budget,
            "Cache size {} exceeds budget {}",
            total_size,
            budget
        );
    }

    /// Assert that a store finished loading.
    #[track_caller]
    pub fn assert_ready(status: &SyncStatus) {
        assert_eq!(status.phase, SyncPhase::Ready, "Store not ready: {:?}", status);
    }

    /// Assert that a store is holding back pushes because of quota.
    #[track_caller]
    pub fn assert_quota_warning(status: &SyncStatus) {
        assert!(status.quota_exceeded, "Expected quota warning: {:?}", status);
    }

    /// Assert that a SyncResult is a QuotaExceeded error.
    #[track_caller]
    pub fn assert_quota_exceeded<T: std::fmt::Debug>(result: &SyncResult<T>) {
        match result {
            Err(SyncError::QuotaExceeded { .. }) => {}
            other => panic!("Expected QuotaExceeded error, got: {:?}", other),
        }
    }

    /// Assert that a SyncResult is a RemoteUnavailable error.
    #[track_caller]
    pub fn assert_remote_unavailable<T: std::fmt::Debug>(result: &SyncResult<T>) {
        match result {
            Err(SyncError::RemoteUnavailable { .. }) => {}
            other => panic!("Expected RemoteUnavailable error, got: {:?}", other),
        }
    }

    /// Assert that a FeedVaultResult is a Config error.
    #[track_caller]
    pub fn assert_config_error<T: std::fmt::Debug>(result: &FeedVaultResult<T>) {
        match result {
            Err(FeedVaultError::Config(_)) => {}
            other => panic!("Expected Config error, got: {:?}", other),
        }
    }

    /// Assert that a FeedVaultConfig is valid.
    #[track_caller]
    pub fn assert_config_valid(config: &FeedVaultConfig) {
        if let Err(e) = config.validate() {
            panic!("Config validation failed: {:?}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_page_ids_are_consecutive() {
        let page = fixtures::feed_page(10, 3);
        let ids: Vec<i64> = page.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![10, 11, 12]);
    }

    #[test]
    fn test_temp_config_is_valid() {
        let (config, _temp_dir) = fixtures::temp_config();
        assertions::assert_config_valid(&config);
    }

    #[test]
    fn test_init_test_tracing_is_idempotent() {
        init_test_tracing();
        init_test_tracing();
    }
}
