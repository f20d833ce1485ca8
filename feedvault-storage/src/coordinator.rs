//! Cache coordinator.
//!
//! Single entry point for view-models: cached content pages, the seen-items
//! and excluded-tags stores, the media cache and the published size metrics.
//! Nothing here fails the caller; cache trouble degrades to misses and sync
//! trouble keeps the last known value.

use std::sync::Arc;

use feedvault_core::keys::FEED_PREFIX;
use feedvault_core::{CacheableRecord, FeedVaultConfig, FeedVaultResult, SyncResult};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::cache::{CacheStats, DiskCache, MediaCache};
use crate::kv::{InMemoryKeyValueStore, KeyValueStore, LmdbKeyValueStore};
use crate::sync::{ExcludedTags, RemoteStore, SeenItems, SyncedStateStore};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// On-disk footprint of the caches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheMetrics {
    /// Bytes used by cached content pages.
    pub content_bytes: u64,
    /// Bytes used by the media cache.
    pub media_bytes: u64,
}

impl CacheMetrics {
    pub fn content_mb(&self) -> f64 {
        self.content_bytes as f64 / BYTES_PER_MB
    }

    pub fn media_mb(&self) -> f64 {
        self.media_bytes as f64 / BYTES_PER_MB
    }

    pub fn total_bytes(&self) -> u64 {
        self.content_bytes.saturating_add(self.media_bytes)
    }
}

pub struct CacheCoordinator {
    /// `None` when the cache directory could not be created.
    disk: Option<DiskCache>,
    seen_items: SyncedStateStore<SeenItems>,
    excluded_tags: SyncedStateStore<ExcludedTags>,
    media: Arc<dyn MediaCache>,
    metrics: watch::Sender<CacheMetrics>,
}

impl CacheCoordinator {
    pub fn new(
        disk: Option<DiskCache>,
        seen_items: SyncedStateStore<SeenItems>,
        excluded_tags: SyncedStateStore<ExcludedTags>,
        media: Arc<dyn MediaCache>,
    ) -> Self {
        let (metrics, _) = watch::channel(CacheMetrics::default());
        Self {
            disk,
            seen_items,
            excluded_tags,
            media,
            metrics,
        }
    }

    /// Wire every component from configuration, load both synced stores
    /// and start listening for remote changes.
    ///
    /// A disk cache that cannot be created only disables page caching. A
    /// local store that cannot be opened is replaced by an in-memory one, so
    /// synced state still works but is not kept across restarts.
    pub async fn open(
        config: &FeedVaultConfig,
        remote: Arc<dyn RemoteStore>,
        media: Arc<dyn MediaCache>,
    ) -> FeedVaultResult<Self> {
        config.validate()?;

        let disk = match DiskCache::new(&config.disk_cache) {
            Ok(cache) => Some(cache),
            Err(e) => {
                warn!(error = %e, "Disk cache unavailable, page caching disabled");
                None
            }
        };

        let sync = &config.sync;
        let local: Arc<dyn KeyValueStore> =
            match LmdbKeyValueStore::new(&sync.local_store_path, sync.local_store_max_size_mb) {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    warn!(
                        path = %sync.local_store_path.display(),
                        error = %e,
                        "Local store unavailable, keeping synced state in memory"
                    );
                    Arc::new(InMemoryKeyValueStore::new())
                }
            };
        let seen_items = SyncedStateStore::new(
            &sync.seen_items_key,
            Arc::clone(&local),
            Arc::clone(&remote),
            sync.debounce(),
        );
        let excluded_tags =
            SyncedStateStore::new(&sync.excluded_tags_key, local, remote, sync.debounce());

        let coordinator = Self::new(disk, seen_items, excluded_tags, media);
        coordinator.seen_items.load().await;
        coordinator.excluded_tags.load().await;
        coordinator.seen_items.listen();
        coordinator.excluded_tags.listen();
        coordinator.refresh_metrics().await;
        Ok(coordinator)
    }

    // ------------------------------------------------------------------------
    // Content pages
    // ------------------------------------------------------------------------

    pub async fn save_items<R: CacheableRecord>(&self, records: &[R], key: &str) {
        if let Some(disk) = &self.disk {
            disk.save(key, records).await;
            self.refresh_metrics().await;
        }
    }

    /// Load a cached page. A corrupted entry is deleted by the cache, so the
    /// published size is refreshed when that happens.
    pub async fn load_items<R: CacheableRecord>(&self, key: &str) -> Option<Vec<R>> {
        let disk = self.disk.as_ref()?;
        let corrupted_before = disk.stats().corrupted;
        let records = disk.load(key).await;
        if disk.stats().corrupted != corrupted_before {
            self.refresh_metrics().await;
        }
        records
    }

    pub async fn clear_cache(&self, key: &str) {
        if let Some(disk) = &self.disk {
            disk.clear(key).await;
            self.refresh_metrics().await;
        }
    }

    /// Drop every cached feed page. Returns the number of entries removed.
    pub async fn clear_feed_caches(&self) -> u64 {
        let Some(disk) = &self.disk else {
            return 0;
        };
        let removed = disk.clear_prefix(FEED_PREFIX).await;
        debug!(removed, "Cleared feed caches");
        self.refresh_metrics().await;
        removed
    }

    /// Clear cached pages, seen items (everywhere) and the media cache.
    ///
    /// Excluded tags are user settings and survive.
    pub async fn clear_everything(&self) {
        if let Some(disk) = &self.disk {
            let removed = disk.clear_all().await;
            debug!(removed, "Cleared content cache");
        }
        self.seen_items.reset().await;
        self.media.clear_disk_cache().await;
        self.refresh_metrics().await;
    }

    pub fn disk_cache(&self) -> Option<&DiskCache> {
        self.disk.as_ref()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.disk.as_ref().map(DiskCache::stats).unwrap_or_default()
    }

    // ------------------------------------------------------------------------
    // Metrics
    // ------------------------------------------------------------------------

    /// Measure both caches and publish the result.
    pub async fn refresh_metrics(&self) -> CacheMetrics {
        let content_bytes = match &self.disk {
            Some(disk) => disk.total_size().await,
            None => 0,
        };
        let metrics = CacheMetrics {
            content_bytes,
            media_bytes: self.media.disk_usage().await,
        };
        self.metrics.send_replace(metrics);
        metrics
    }

    /// The last published metrics.
    pub fn metrics(&self) -> CacheMetrics {
        *self.metrics.borrow()
    }

    pub fn subscribe_metrics(&self) -> watch::Receiver<CacheMetrics> {
        self.metrics.subscribe()
    }

    // ------------------------------------------------------------------------
    // Synced state
    // ------------------------------------------------------------------------

    pub fn seen_items(&self) -> &SyncedStateStore<SeenItems> {
        &self.seen_items
    }

    pub fn excluded_tags(&self) -> &SyncedStateStore<ExcludedTags> {
        &self.excluded_tags
    }

    pub async fn mark_seen(&self, id: i64) {
        self.seen_items
            .mutate(|seen| {
                seen.insert(id);
            })
            .await;
    }

    pub async fn mark_all_seen(&self, ids: impl IntoIterator<Item = i64>) {
        self.seen_items.mutate(|seen| seen.extend(ids)).await;
    }

    pub fn is_seen(&self, id: i64) -> bool {
        self.seen_items.current().contains(id)
    }

    /// Exclude or re-include a tag. Excluding an unknown tag adds it.
    pub async fn set_tag_excluded(&self, tag: &str, excluded: bool) {
        self.excluded_tags
            .mutate(|tags| {
                if !tags.set_enabled(tag, excluded) && excluded {
                    tags.add(tag);
                }
            })
            .await;
    }

    pub async fn remove_excluded_tag(&self, tag: &str) {
        self.excluded_tags
            .mutate(|tags| {
                tags.remove(tag);
            })
            .await;
    }

    pub fn is_tag_excluded(&self, tag: &str) -> bool {
        self.excluded_tags.current().is_excluded(tag)
    }

    /// Push both synced stores now. Both are attempted; the first error is
    /// returned.
    pub async fn flush(&self) -> SyncResult<()> {
        let seen = self.seen_items.flush().await;
        let tags = self.excluded_tags.flush().await;
        seen.and(tags)
    }

    pub fn shutdown(&self) {
        self.seen_items.shutdown();
        self.excluded_tags.shutdown();
    }
}

impl std::fmt::Debug for CacheCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheCoordinator")
            .field("disk", &self.disk)
            .field("seen_items", &self.seen_items)
            .field("excluded_tags", &self.excluded_tags)
            .field("metrics", &self.metrics())
            .finish()
    }
}
