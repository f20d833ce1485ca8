//! Cache statistics and the media cache collaborator.

use async_trait::async_trait;

/// External cache for decoded images and video segments.
///
/// The media cache is managed by its own library; the coordinator only
/// asks it to clear itself and to report its footprint.
#[async_trait]
pub trait MediaCache: Send + Sync {
    /// Remove everything the media cache keeps on disk.
    async fn clear_disk_cache(&self);

    /// Bytes currently used on disk.
    async fn disk_usage(&self) -> u64;
}

/// Media cache that stores nothing, for builds without image caching.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMediaCache;

#[async_trait]
impl MediaCache for NoMediaCache {
    async fn clear_disk_cache(&self) {}

    async fn disk_usage(&self) -> u64 {
        0
    }
}

/// Statistics about disk cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of loads that returned records.
    pub hits: u64,
    /// Number of loads that found nothing usable.
    pub misses: u64,
    /// Number of committed writes.
    pub writes: u64,
    /// Number of entries removed by LRU eviction.
    pub evictions: u64,
    /// Number of entries removed because their payload failed to decode.
    pub corrupted: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats {
            hits: 80,
            misses: 20,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.8).abs() < 0.001);

        let empty_stats = CacheStats::default();
        assert!((empty_stats.hit_rate() - 0.0).abs() < 0.001);
    }

    #[tokio::test]
    async fn test_no_media_cache_reports_zero() {
        let media = NoMediaCache;
        media.clear_disk_cache().await;
        assert_eq!(media.disk_usage().await, 0);
    }
}
