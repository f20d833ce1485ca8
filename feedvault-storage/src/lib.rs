//! FEEDVAULT Storage - Page Cache, Synced State, Coordination
//!
//! Local persistence for a media-board client: a size-bounded disk cache
//! for fetched content pages, small user state synchronized across devices
//! through a remote key/value store, and a coordinator tying both together
//! for the UI layer.

pub mod cache;
pub mod coordinator;
pub mod kv;
pub mod sync;

pub use cache::{CacheStats, DiskCache, MediaCache, NoMediaCache, SanitizedKey};
pub use coordinator::{CacheCoordinator, CacheMetrics};
pub use kv::{InMemoryKeyValueStore, KeyValueStore, LmdbKeyValueStore, LmdbStoreError};
pub use sync::{
    ChangeReason, Debouncer, ExcludedTag, ExcludedTags, ExternalChange, InMemoryRemoteStore,
    MergePolicy, Reconciliation, RemoteStore, RemoteStoreError, SeenItems, SyncPhase, SyncStatus,
    SyncedStateStore, SyncedValue,
};
