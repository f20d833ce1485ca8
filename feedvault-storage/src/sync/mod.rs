//! Cross-device synchronization of small user state.
//!
//! A [`SyncedStateStore`] keeps one [`SyncedValue`] consistent between
//! memory, the local [`KeyValueStore`](crate::kv::KeyValueStore) and a
//! [`RemoteStore`]. Local writes happen on every mutation; remote writes are
//! debounced.

pub mod debounce;
pub mod remote;
pub mod store;
pub mod value;

pub use debounce::Debouncer;
pub use remote::{ChangeReason, ExternalChange, InMemoryRemoteStore, RemoteStore, RemoteStoreError};
pub use store::{SyncPhase, SyncStatus, SyncedStateStore};
pub use value::{ExcludedTag, ExcludedTags, MergePolicy, Reconciliation, SeenItems, SyncedValue};
