//! Size-bounded, LRU-evicted disk cache for content pages.
//!
//! Each cache key maps to one JSON file holding an ordered sequence of
//! records. Writes go to a temp file that is renamed over the entry, so a
//! crash mid-write never leaves a half-written entry behind. The file's
//! modification time is the LRU signal: it is set by every write and
//! touched by every successful read.
//!
//! # Failure Model
//!
//! Cache writes and reads are best-effort. [`DiskCache::save`] and
//! [`DiskCache::load`] log failures and degrade to "no cache"; the `try_`
//! variants expose the error for callers that want it. An entry whose payload
//! no longer decodes is deleted on read; `load` reports it as a miss and
//! `try_load` as [`CacheError::Corrupted`].
//!
//! # Thread Safety
//!
//! All operations on one `DiskCache` are serialized by an internal async
//! mutex. Different `DiskCache` instances must not share a directory.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::SystemTime;

use feedvault_core::{CacheError, CacheResult, DiskCacheConfig};
use filetime::FileTime;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::key::{self, SanitizedKey, TEMP_EXTENSION};
use super::traits::CacheStats;

/// One committed entry as seen during a directory scan.
#[derive(Debug, Clone)]
struct EntryInfo {
    name: String,
    path: PathBuf,
    size: u64,
    accessed: SystemTime,
}

/// Disk-backed page cache with a total size budget.
///
/// # Example
///
/// ```ignore
/// let cache = DiskCache::new(&DiskCacheConfig::new(cache_dir))?;
///
/// cache.save("feed_new_flags_1", &items).await;
/// let cached: Option<Vec<FeedItem>> = cache.load("feed_new_flags_1").await;
/// ```
#[derive(Debug)]
pub struct DiskCache {
    directory: PathBuf,
    max_size_bytes: u64,
    /// Serializes every operation against the directory.
    lock: Mutex<()>,
    stats: RwLock<CacheStats>,
}

impl DiskCache {
    /// Open the cache described by `config`, creating its directory.
    pub fn new(config: &DiskCacheConfig) -> CacheResult<Self> {
        Self::with_budget(&config.directory, config.max_size_bytes())
    }

    /// Open a cache in `directory` with an explicit byte budget.
    ///
    /// Temp files left behind by an interrupted write are removed.
    pub fn with_budget(directory: impl Into<PathBuf>, max_size_bytes: u64) -> CacheResult<Self> {
        let directory = directory.into();
        fs::create_dir_all(&directory).map_err(|e| CacheError::io(&directory, &e))?;

        let cache = Self {
            directory,
            max_size_bytes,
            lock: Mutex::new(()),
            stats: RwLock::new(CacheStats::default()),
        };

        let swept = cache.sweep_temp_files();
        if swept > 0 {
            debug!(count = swept, directory = ?cache.directory, "Removed orphaned cache temp files");
        }
        Ok(cache)
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_bytes
    }

    /// On-disk location of the entry for `key`.
    pub fn entry_path(&self, key: &str) -> CacheResult<PathBuf> {
        Ok(SanitizedKey::new(key)?.entry_path(&self.directory))
    }

    /// Snapshot of the usage counters.
    pub fn stats(&self) -> CacheStats {
        self.stats.read().map(|s| s.clone()).unwrap_or_default()
    }

    // ========================================================================
    // WRITES
    // ========================================================================

    /// Store `records` under `key`, replacing any previous entry.
    ///
    /// Failures are logged and swallowed.
    pub async fn save<R: Serialize>(&self, key: &str, records: &[R]) {
        if let Err(e) = self.try_save(key, records).await {
            warn!(key, error = %e, "Cache write failed, continuing without cache");
        }
    }

    /// Store `records` under `key` and run the size enforcement pass.
    pub async fn try_save<R: Serialize>(&self, key: &str, records: &[R]) -> CacheResult<()> {
        let sanitized = SanitizedKey::new(key)?;
        let payload = serde_json::to_vec(records).map_err(|e| CacheError::Serialization {
            key: key.to_string(),
            reason: e.to_string(),
        })?;

        let _guard = self.lock.lock().await;
        self.write_atomic(&sanitized, &payload)?;
        self.record(|s| s.writes += 1);
        debug!(key, bytes = payload.len(), count = records.len(), "Cached page");

        self.enforce_size_limit_locked();
        Ok(())
    }

    fn write_atomic(&self, key: &SanitizedKey, payload: &[u8]) -> CacheResult<()> {
        let temp_path = key.temp_path(&self.directory);
        let entry_path = key.entry_path(&self.directory);

        // The directory may have been wiped by the OS since open.
        fs::create_dir_all(&self.directory).map_err(|e| CacheError::io(&self.directory, &e))?;

        let written = File::create(&temp_path).and_then(|mut file| {
            file.write_all(payload)?;
            file.sync_all()
        });
        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path);
            return Err(CacheError::io(&temp_path, &e));
        }

        fs::rename(&temp_path, &entry_path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            CacheError::io(&entry_path, &e)
        })
    }

    // ========================================================================
    // READS
    // ========================================================================

    /// Load the records cached under `key`.
    ///
    /// Returns `None` on a miss, on I/O failure, and for corrupted entries.
    pub async fn load<R: DeserializeOwned>(&self, key: &str) -> Option<Vec<R>> {
        match self.try_load(key).await {
            Ok(records) => records,
            Err(e) => {
                warn!(key, error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    /// Load the records cached under `key`.
    ///
    /// A missing entry is `Ok(None)`. A corrupted entry is deleted before
    /// [`CacheError::Corrupted`] is returned.
    pub async fn try_load<R: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<Vec<R>>> {
        let sanitized = SanitizedKey::new(key)?;
        let path = sanitized.entry_path(&self.directory);

        let _guard = self.lock.lock().await;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.record(|s| s.misses += 1);
                return Ok(None);
            }
            Err(e) => {
                self.record(|s| s.misses += 1);
                return Err(CacheError::io(&path, &e));
            }
        };

        match serde_json::from_slice::<Vec<R>>(&bytes) {
            Ok(records) => {
                if let Err(e) = filetime::set_file_mtime(&path, FileTime::now()) {
                    debug!(key, error = %e, "Failed to touch cache entry");
                }
                self.record(|s| s.hits += 1);
                Ok(Some(records))
            }
            Err(e) => {
                remove_entry_file(&path);
                self.record(|s| {
                    s.corrupted += 1;
                    s.misses += 1;
                });
                Err(CacheError::Corrupted {
                    key: key.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    // ========================================================================
    // CLEARING
    // ========================================================================

    /// Delete the entry for `key`. A missing entry is not an error.
    pub async fn clear(&self, key: &str) {
        let sanitized = match SanitizedKey::new(key) {
            Ok(sanitized) => sanitized,
            Err(e) => {
                warn!(key, error = %e, "Cannot clear cache entry");
                return;
            }
        };
        let _guard = self.lock.lock().await;
        remove_entry_file(&sanitized.entry_path(&self.directory));
    }

    /// Delete every entry whose sanitized name satisfies `predicate`.
    ///
    /// Original keys are not recoverable from disk, so the predicate sees the
    /// sanitized identity. Returns the number of entries removed.
    pub async fn clear_matching<F>(&self, predicate: F) -> u64
    where
        F: Fn(&str) -> bool,
    {
        let _guard = self.lock.lock().await;
        let mut removed = 0u64;
        for entry in self.list_entries() {
            if predicate(&entry.name) && remove_entry_file(&entry.path) {
                removed += 1;
            }
        }
        debug!(count = removed, "Cleared cache entries");
        removed
    }

    /// Delete every entry whose key starts with `prefix`, e.g. all feed pages.
    pub async fn clear_prefix(&self, prefix: &str) -> u64 {
        let prefix = key::sanitize(prefix);
        self.clear_matching(|name| name.starts_with(&prefix)).await
    }

    /// Delete every entry.
    pub async fn clear_all(&self) -> u64 {
        let removed = self.clear_matching(|_| true).await;
        self.sweep_temp_files();
        removed
    }

    // ========================================================================
    // SIZE ACCOUNTING
    // ========================================================================

    /// Total on-disk size of all committed entries.
    pub async fn total_size(&self) -> u64 {
        let _guard = self.lock.lock().await;
        self.list_entries().iter().map(|e| e.size).sum()
    }

    /// Evict least recently used entries until the budget is met.
    ///
    /// Runs automatically after every save. Returns the number of evicted entries.
    pub async fn enforce_size_limit(&self) -> u64 {
        let _guard = self.lock.lock().await;
        self.enforce_size_limit_locked()
    }

    fn enforce_size_limit_locked(&self) -> u64 {
        let mut entries = self.list_entries();
        let mut total: u64 = entries.iter().map(|e| e.size).sum();
        if total <= self.max_size_bytes {
            return 0;
        }

        entries.sort_by(|a, b| a.accessed.cmp(&b.accessed).then_with(|| a.name.cmp(&b.name)));

        let mut evicted = 0u64;
        for entry in entries {
            if total <= self.max_size_bytes {
                break;
            }
            if remove_entry_file(&entry.path) {
                evicted += 1;
            }
            // A concurrent external delete also frees the space.
            total = total.saturating_sub(entry.size);
        }

        self.record(|s| s.evictions += evicted);
        debug!(
            evicted,
            total_bytes = total,
            max_bytes = self.max_size_bytes,
            "Enforced cache size limit"
        );
        evicted
    }

    /// Scan the directory for committed entries.
    fn list_entries(&self) -> Vec<EntryInfo> {
        let read_dir = match fs::read_dir(&self.directory) {
            Ok(read_dir) => read_dir,
            Err(e) => {
                warn!(directory = ?self.directory, error = %e, "Failed to scan cache directory");
                return Vec::new();
            }
        };

        let mut entries = Vec::new();
        for dir_entry in read_dir.flatten() {
            let file_name = dir_entry.file_name();
            let Some(name) = file_name.to_str().and_then(key::entry_name) else {
                continue;
            };
            let Ok(metadata) = dir_entry.metadata() else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }
            entries.push(EntryInfo {
                name: name.to_string(),
                path: dir_entry.path(),
                size: metadata.len(),
                accessed: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            });
        }
        entries
    }

    fn sweep_temp_files(&self) -> u64 {
        let Ok(read_dir) = fs::read_dir(&self.directory) else {
            return 0;
        };
        let mut removed = 0u64;
        for dir_entry in read_dir.flatten() {
            let is_temp = dir_entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.ends_with(TEMP_EXTENSION));
            if is_temp && remove_entry_file(&dir_entry.path()) {
                removed += 1;
            }
        }
        removed
    }

    fn record(&self, update: impl FnOnce(&mut CacheStats)) {
        if let Ok(mut stats) = self.stats.write() {
            update(&mut stats);
        }
    }
}

/// Remove one file. Returns true if a file was deleted.
fn remove_entry_file(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => true,
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        Err(e) => {
            warn!(path = ?path, error = %e, "Failed to remove cache file");
            false
        }
    }
}
