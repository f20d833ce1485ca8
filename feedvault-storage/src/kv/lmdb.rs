//! LMDB-backed local key/value store.
//!
//! Uses the heed crate (Rust bindings for LMDB) to provide a small durable
//! store for the synced state mirrors.
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. The store uses:
//! - Read transactions for `get`
//! - Write transactions for `set` and `remove`

use std::path::Path;

use feedvault_core::{FeedVaultError, SyncError, SyncResult};
use heed::types::{Bytes, Str};
use heed::{Database, Env, EnvOpenOptions};

use super::KeyValueStore;

/// Error type for LMDB store operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbStoreError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convert LmdbStoreError to SyncError.
impl From<LmdbStoreError> for SyncError {
    fn from(e: LmdbStoreError) -> Self {
        SyncError::LocalStore {
            reason: e.to_string(),
        }
    }
}

impl From<LmdbStoreError> for FeedVaultError {
    fn from(e: LmdbStoreError) -> Self {
        FeedVaultError::Sync(e.into())
    }
}

/// LMDB-backed key/value store.
///
/// # Example
///
/// ```ignore
/// use feedvault_storage::kv::{KeyValueStore, LmdbKeyValueStore};
///
/// let store = LmdbKeyValueStore::new("/tmp/feedvault-kv", 16)?;
/// store.set("seenItems", b"[1,2,3]")?;
/// assert!(store.get("seenItems")?.is_some());
/// ```
pub struct LmdbKeyValueStore {
    /// The LMDB environment.
    env: Env,
    /// The main database (single unnamed database).
    db: Database<Str, Bytes>,
}

impl LmdbKeyValueStore {
    /// Open or create a store.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory cannot be created
    /// - LMDB environment cannot be opened
    /// - Database cannot be created
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbStoreError> {
        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment directory is private to this store and is
        // opened once per process.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbStoreError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        let db: Database<Str, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbStoreError::DbOpen(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        Ok(Self { env, db })
    }
}

impl KeyValueStore for LmdbKeyValueStore {
    fn get(&self, key: &str) -> SyncResult<Option<Vec<u8>>> {
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        let value = self
            .db
            .get(&rtxn, key)
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        Ok(value.map(|bytes| bytes.to_vec()))
    }

    fn set(&self, key: &str, value: &[u8]) -> SyncResult<()> {
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        self.db
            .put(&mut wtxn, key, value)
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        Ok(())
    }

    fn remove(&self, key: &str) -> SyncResult<()> {
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        self.db
            .delete(&mut wtxn, key)
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        Ok(())
    }
}
