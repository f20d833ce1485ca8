//! Remote key/value store shared by all devices of one account.
//!
//! The remote store replicates on its own schedule and reports changes made
//! elsewhere through [`ExternalChange`] notifications. Its replication
//! protocol is opaque to this crate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use feedvault_core::{FeedVaultError, SyncError};
use thiserror::Error;
use tokio::sync::broadcast;

/// Capacity of the change notification channel.
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Why the remote store reported a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeReason {
    /// Another device wrote one of the listed keys.
    ServerChange,
    /// The first sync after install or sign-in completed.
    InitialSync,
    /// The signed-in account changed; every value is suspect.
    AccountChange,
    /// The store is over its quota and rejects writes.
    QuotaViolation,
}

/// A change notification emitted by the remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalChange {
    pub reason: ChangeReason,
    pub keys: Vec<String>,
}

impl ExternalChange {
    pub fn new(reason: ChangeReason, keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            reason,
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether `key` is among the changed keys.
    pub fn touches(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }
}

/// Errors reported by a remote store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteStoreError {
    #[error("remote store unavailable: {0}")]
    Unavailable(String),

    #[error("not authorized for the remote store")]
    Unauthorized,

    #[error("remote store quota exceeded")]
    QuotaExceeded,
}

impl RemoteStoreError {
    /// Attach the key being accessed and convert into a [`SyncError`].
    pub fn for_key(self, key: &str) -> SyncError {
        match self {
            RemoteStoreError::Unavailable(reason) => SyncError::RemoteUnavailable { reason },
            RemoteStoreError::Unauthorized => SyncError::Unauthorized,
            RemoteStoreError::QuotaExceeded => SyncError::QuotaExceeded {
                key: key.to_string(),
            },
        }
    }
}

impl From<RemoteStoreError> for FeedVaultError {
    fn from(e: RemoteStoreError) -> Self {
        FeedVaultError::Sync(e.for_key("unknown"))
    }
}

/// Cross-device key/value store.
///
/// Implementations must be thread-safe. `synchronize` asks the store to
/// exchange pending changes with its backend and reports whether it could.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Read the bytes stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, RemoteStoreError>;

    /// Store `value` under `key`.
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), RemoteStoreError>;

    /// Remove `key`.
    async fn remove(&self, key: &str) -> Result<(), RemoteStoreError>;

    /// Push pending writes and pull remote ones.
    async fn synchronize(&self) -> bool;

    /// Subscribe to changes made outside this process.
    fn subscribe(&self) -> broadcast::Receiver<ExternalChange>;
}

/// In-memory remote store.
///
/// Stands in for the cloud store in tests and offline builds. Writes by
/// "other devices" are simulated with [`InMemoryRemoteStore::external_write`],
/// outages with [`InMemoryRemoteStore::set_available`] and quota exhaustion with
/// [`InMemoryRemoteStore::set_quota_exceeded`].
#[derive(Debug)]
pub struct InMemoryRemoteStore {
    values: RwLock<HashMap<String, Vec<u8>>>,
    /// Every accepted `set`, in order.
    write_log: RwLock<Vec<(String, Vec<u8>)>>,
    changes: broadcast::Sender<ExternalChange>,
    available: AtomicBool,
    quota_exceeded: AtomicBool,
    synchronize_calls: AtomicU64,
}

impl Default for InMemoryRemoteStore {
    fn default() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            values: RwLock::new(HashMap::new()),
            write_log: RwLock::new(Vec::new()),
            changes,
            available: AtomicBool::new(true),
            quota_exceeded: AtomicBool::new(false),
            synchronize_calls: AtomicU64::new(0),
        }
    }
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the store going offline or coming back.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Make `set` fail with [`RemoteStoreError::QuotaExceeded`].
    pub fn set_quota_exceeded(&self, exceeded: bool) {
        self.quota_exceeded.store(exceeded, Ordering::SeqCst);
    }

    /// Write `value` as another device would and notify subscribers.
    pub fn external_write(&self, key: &str, value: Vec<u8>) {
        if let Ok(mut values) = self.values.write() {
            values.insert(key.to_string(), value);
        }
        self.emit(ExternalChange::new(ChangeReason::ServerChange, [key]));
    }

    /// Remove `key` as another device would and notify subscribers.
    pub fn external_remove(&self, key: &str) {
        if let Ok(mut values) = self.values.write() {
            values.remove(key);
        }
        self.emit(ExternalChange::new(ChangeReason::ServerChange, [key]));
    }

    /// Broadcast a change notification. Returns the number of receivers.
    pub fn emit(&self, change: ExternalChange) -> usize {
        self.changes.send(change).unwrap_or(0)
    }

    /// Read a value regardless of availability.
    pub fn peek(&self, key: &str) -> Option<Vec<u8>> {
        self.values.read().ok().and_then(|v| v.get(key).cloned())
    }

    /// Accepted writes for `key`, oldest first.
    pub fn writes_for(&self, key: &str) -> Vec<Vec<u8>> {
        self.write_log
            .read()
            .map(|log| {
                log.iter()
                    .filter(|(k, _)| k == key)
                    .map(|(_, v)| v.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of accepted writes for `key`.
    pub fn write_count(&self, key: &str) -> usize {
        self.writes_for(key).len()
    }

    pub fn synchronize_calls(&self) -> u64 {
        self.synchronize_calls.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), RemoteStoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RemoteStoreError::Unavailable("offline".to_string()))
        }
    }
}

fn poisoned() -> RemoteStoreError {
    RemoteStoreError::Unavailable("remote store lock poisoned".to_string())
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, RemoteStoreError> {
        self.check_available()?;
        let values = self.values.read().map_err(|_| poisoned())?;
        Ok(values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), RemoteStoreError> {
        self.check_available()?;
        if self.quota_exceeded.load(Ordering::SeqCst) {
            return Err(RemoteStoreError::QuotaExceeded);
        }
        self.values
            .write()
            .map_err(|_| poisoned())?
            .insert(key.to_string(), value.clone());
        self.write_log
            .write()
            .map_err(|_| poisoned())?
            .push((key.to_string(), value));
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), RemoteStoreError> {
        self.check_available()?;
        self.values.write().map_err(|_| poisoned())?.remove(key);
        Ok(())
    }

    async fn synchronize(&self) -> bool {
        self.synchronize_calls.fetch_add(1, Ordering::SeqCst);
        self.available.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> broadcast::Receiver<ExternalChange> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_change_touches() {
        let change = ExternalChange::new(ChangeReason::ServerChange, ["seenItems", "other"]);
        assert!(change.touches("seenItems"));
        assert!(!change.touches("excludedTags"));
    }

    #[test]
    fn test_error_for_key() {
        let err = RemoteStoreError::QuotaExceeded.for_key("seenItems");
        assert_eq!(
            err,
            SyncError::QuotaExceeded {
                key: "seenItems".to_string()
            }
        );
        assert_eq!(
            RemoteStoreError::Unauthorized.for_key("seenItems"),
            SyncError::Unauthorized
        );
    }

    #[tokio::test]
    async fn test_set_get_remove() {
        let store = InMemoryRemoteStore::new();
        store
            .set("seenItems", b"[1]".to_vec())
            .await
            .expect("set should succeed");
        assert_eq!(
            store.get("seenItems").await.expect("get should succeed"),
            Some(b"[1]".to_vec())
        );
        assert_eq!(store.write_count("seenItems"), 1);

        store.remove("seenItems").await.expect("remove should succeed");
        assert_eq!(store.get("seenItems").await.expect("get should succeed"), None);
    }

    #[tokio::test]
    async fn test_unavailable_and_quota() {
        let store = InMemoryRemoteStore::new();
        store.set_available(false);
        assert!(matches!(
            store.get("seenItems").await,
            Err(RemoteStoreError::Unavailable(_))
        ));
        assert!(!store.synchronize().await);

        store.set_available(true);
        store.set_quota_exceeded(true);
        assert_eq!(
            store.set("seenItems", b"[1]".to_vec()).await,
            Err(RemoteStoreError::QuotaExceeded)
        );
        assert_eq!(store.write_count("seenItems"), 0);
    }

    #[tokio::test]
    async fn test_external_write_notifies() {
        let store = InMemoryRemoteStore::new();
        let mut changes = store.subscribe();

        store.external_write("excludedTags", b"[]".to_vec());
        let change = changes.recv().await.expect("change should arrive");
        assert_eq!(change.reason, ChangeReason::ServerChange);
        assert!(change.touches("excludedTags"));
        assert_eq!(store.peek("excludedTags"), Some(b"[]".to_vec()));
        // External writes are not writes made by this process.
        assert_eq!(store.write_count("excludedTags"), 0);
    }
}
