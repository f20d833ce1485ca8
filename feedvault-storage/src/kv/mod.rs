//! Local durable key/value byte stores.
//!
//! The synced state stores mirror their values here so the last known value
//! survives restarts and remote outages.

pub mod lmdb;

use std::collections::HashMap;
use std::sync::RwLock;

use feedvault_core::{SyncError, SyncResult};

pub use lmdb::{LmdbKeyValueStore, LmdbStoreError};

/// Durable key/value byte store.
///
/// Implementations must be thread-safe; operations are short and synchronous.
pub trait KeyValueStore: Send + Sync {
    /// Read the bytes stored under `key`.
    fn get(&self, key: &str) -> SyncResult<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &[u8]) -> SyncResult<()>;

    /// Remove `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> SyncResult<()>;
}

/// In-memory key/value store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct InMemoryKeyValueStore {
    values: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.values.read().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> SyncError {
    SyncError::LocalStore {
        reason: "in-memory store lock poisoned".to_string(),
    }
}

impl KeyValueStore for InMemoryKeyValueStore {
    fn get(&self, key: &str) -> SyncResult<Option<Vec<u8>>> {
        let values = self.values.read().map_err(|_| poisoned())?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> SyncResult<()> {
        let mut values = self.values.write().map_err(|_| poisoned())?;
        values.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> SyncResult<()> {
        let mut values = self.values.write().map_err(|_| poisoned())?;
        values.remove(key);
        Ok(())
    }
}
