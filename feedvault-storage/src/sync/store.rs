//! Synced state store.
//!
//! Holds one named value in three places: the in-memory published copy,
//! a local durable mirror and the cross-device remote store. The in-memory
//! copy is authoritative for the process; the remote copy is authoritative
//! across devices and is reconciled through [`SyncedValue::reconcile`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock};
use std::time::Duration;

use feedvault_core::{SyncError, SyncResult};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::debounce::Debouncer;
use super::remote::{ChangeReason, ExternalChange, RemoteStore};
use super::value::{Reconciliation, SyncedValue};
use crate::kv::KeyValueStore;

/// Load phase of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Uninitialized,
    Loading,
    Ready,
}

/// Snapshot of a store's synchronization state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatus {
    pub phase: SyncPhase,
    /// The remote store reported a quota violation; pushes are skipped.
    pub quota_exceeded: bool,
    /// A debounced push is waiting for its quiet interval.
    pub push_pending: bool,
    /// Error of the most recent failed push, cleared by a successful one.
    pub last_push_error: Option<SyncError>,
}

struct StoreInner<T: SyncedValue> {
    key: String,
    local: Arc<dyn KeyValueStore>,
    remote: Arc<dyn RemoteStore>,
    /// Serializes load, mutation, reconciliation and push.
    op_lock: Mutex<()>,
    value: watch::Sender<T>,
    phase: RwLock<SyncPhase>,
    quota_exceeded: AtomicBool,
    /// The remote copy is behind the in-memory value.
    dirty: AtomicBool,
    last_push_error: RwLock<Option<SyncError>>,
    debouncer: Debouncer,
}

/// Keeps one piece of mergeable user state consistent across the local
/// store and the remote store.
///
/// Mutations are persisted locally right away and pushed to the remote
/// store after a quiet interval, so a burst of edits results in a single
/// remote write carrying the final value.
///
/// # Example
///
/// ```ignore
/// let store: SyncedStateStore<SeenItems> =
///     SyncedStateStore::new("seenItems", local, remote, Duration::from_secs(1));
/// store.load().await;
/// store.listen();
/// store.mutate(|seen| { seen.insert(42); }).await;
/// ```
pub struct SyncedStateStore<T: SyncedValue> {
    inner: Arc<StoreInner<T>>,
    listener: StdMutex<Option<JoinHandle<()>>>,
}

impl<T: SyncedValue> SyncedStateStore<T> {
    pub fn new(
        key: impl Into<String>,
        local: Arc<dyn KeyValueStore>,
        remote: Arc<dyn RemoteStore>,
        debounce: Duration,
    ) -> Self {
        let (value, _) = watch::channel(T::empty());
        Self {
            inner: Arc::new(StoreInner {
                key: key.into(),
                local,
                remote,
                op_lock: Mutex::new(()),
                value,
                phase: RwLock::new(SyncPhase::Uninitialized),
                quota_exceeded: AtomicBool::new(false),
                dirty: AtomicBool::new(false),
                last_push_error: RwLock::new(None),
                debouncer: Debouncer::new(debounce),
            }),
            listener: StdMutex::new(None),
        }
    }

    /// The key used in both the local and the remote store.
    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// The current in-memory value.
    pub fn current(&self) -> T {
        self.inner.current()
    }

    /// Observe value changes. Receivers are only woken when the value
    /// actually changes.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.inner.value.subscribe()
    }

    pub fn status(&self) -> SyncStatus {
        SyncStatus {
            phase: self.inner.phase(),
            quota_exceeded: self.inner.quota_exceeded.load(Ordering::SeqCst),
            push_pending: self.inner.debouncer.is_pending(),
            last_push_error: self
                .inner
                .last_push_error
                .read()
                .ok()
                .and_then(|e| e.clone()),
        }
    }

    /// Load the value, preferring the remote copy over the local one.
    pub async fn load(&self) -> T {
        let _guard = self.inner.op_lock.lock().await;
        self.inner.load_locked().await
    }

    /// Apply `f` to the value, persist it locally and schedule a push.
    ///
    /// Returns the resulting value. Nothing happens if `f` leaves the
    /// value unchanged.
    pub async fn mutate<F>(&self, f: F) -> T
    where
        F: FnOnce(&mut T),
    {
        let _guard = self.inner.op_lock.lock().await;
        let current = self.inner.current();
        let mut next = current.clone();
        f(&mut next);
        if next == current {
            return current;
        }

        self.inner.publish(next.clone());
        self.inner.write_local(&next);
        self.inner.dirty.store(true, Ordering::SeqCst);
        self.inner.schedule_push();
        next
    }

    /// Replace the value wholesale.
    pub async fn replace(&self, value: T) -> T {
        self.mutate(move |current| *current = value).await
    }

    /// Push the current value now, cancelling any pending debounced push.
    pub async fn flush(&self) -> SyncResult<()> {
        self.inner.debouncer.cancel();
        let _guard = self.inner.op_lock.lock().await;
        self.inner.push_locked().await
    }

    /// React to a change notification from the remote store.
    pub async fn handle_external_change(&self, change: &ExternalChange) {
        self.inner.handle_external_change(change).await;
    }

    /// Clear the quota warning so pushes resume. An edit held back by the
    /// warning is pushed after the quiet interval.
    pub fn clear_quota_warning(&self) {
        self.inner.clear_quota_flag();
        self.inner.resume_pending_push();
    }

    /// Forget the value everywhere: in memory, locally and remotely.
    pub async fn reset(&self) {
        self.inner.debouncer.cancel();
        let _guard = self.inner.op_lock.lock().await;
        let inner = &self.inner;

        inner.publish(T::empty());
        inner.dirty.store(false, Ordering::SeqCst);
        if let Err(e) = inner.local.remove(&inner.key) {
            warn!(key = %inner.key, error = %e, "Failed to remove local copy");
        }
        if let Err(e) = inner.remote.remove(&inner.key).await {
            warn!(key = %inner.key, error = %e.for_key(&inner.key), "Failed to remove remote copy");
        }
        debug!(key = %inner.key, "Synced value reset");
    }

    /// Dispatch the remote store's change notifications to this store on a
    /// background task. Calling it again replaces the previous listener.
    ///
    /// The task only holds a weak reference and exits once the store is
    /// dropped.
    pub fn listen(&self) {
        let mut changes = self.inner.remote.subscribe();
        let weak = Arc::downgrade(&self.inner);

        let handle = tokio::spawn(async move {
            loop {
                let change = match changes.recv().await {
                    Ok(change) => change,
                    Err(RecvError::Lagged(skipped)) => {
                        let Some(inner) = weak.upgrade() else { break };
                        warn!(key = %inner.key, skipped, "Missed remote change notifications, reconciling");
                        ExternalChange::new(ChangeReason::ServerChange, [inner.key.clone()])
                    }
                    Err(RecvError::Closed) => break,
                };
                let Some(inner) = weak.upgrade() else { break };
                inner.handle_external_change(&change).await;
            }
        });

        if let Ok(mut listener) = self.listener.lock() {
            if let Some(previous) = listener.replace(handle) {
                previous.abort();
            }
        }
    }

    /// Cancel the pending push and stop listening. A push already in flight
    /// is allowed to finish.
    pub fn shutdown(&self) {
        self.inner.debouncer.cancel();
        if let Ok(mut listener) = self.listener.lock() {
            if let Some(handle) = listener.take() {
                handle.abort();
            }
        }
    }
}

impl<T: SyncedValue> Drop for SyncedStateStore<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<T: SyncedValue> std::fmt::Debug for SyncedStateStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncedStateStore")
            .field("key", &self.inner.key)
            .field("status", &self.status())
            .finish()
    }
}

impl<T: SyncedValue> StoreInner<T> {
    fn current(&self) -> T {
        self.value.borrow().clone()
    }

    fn phase(&self) -> SyncPhase {
        self.phase
            .read()
            .map(|phase| *phase)
            .unwrap_or(SyncPhase::Uninitialized)
    }

    fn set_phase(&self, phase: SyncPhase) {
        if let Ok(mut current) = self.phase.write() {
            *current = phase;
        }
    }

    /// Store `value` and notify observers if it differs from the current one.
    fn publish(&self, value: T) -> bool {
        self.value.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        })
    }

    fn encode(&self, value: &T) -> SyncResult<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| SyncError::Encode {
            key: self.key.clone(),
            reason: e.to_string(),
        })
    }

    fn decode(&self, bytes: &[u8]) -> SyncResult<T> {
        serde_json::from_slice(bytes).map_err(|e| SyncError::Decode {
            key: self.key.clone(),
            reason: e.to_string(),
        })
    }

    fn read_local(&self) -> SyncResult<Option<T>> {
        match self.local.get(&self.key)? {
            Some(bytes) => self.decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    async fn read_remote(&self) -> SyncResult<Option<T>> {
        let bytes = self
            .remote
            .get(&self.key)
            .await
            .map_err(|e| e.for_key(&self.key))?;
        match bytes {
            Some(bytes) => self.decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    fn write_local(&self, value: &T) {
        let result = self
            .encode(value)
            .and_then(|bytes| self.local.set(&self.key, &bytes));
        if let Err(e) = result {
            warn!(key = %self.key, error = %e, "Failed to mirror value to local store");
        }
    }

    async fn load_locked(self: &Arc<Self>) -> T {
        self.set_phase(SyncPhase::Loading);

        let mut push_after_load = false;
        let value = match self.read_remote().await {
            Ok(Some(value)) => {
                debug!(key = %self.key, "Loaded value from remote store");
                self.write_local(&value);
                self.dirty.store(false, Ordering::SeqCst);
                value
            }
            outcome => {
                if let Err(e) = outcome {
                    warn!(key = %self.key, error = %e, "Remote read failed, falling back to local store");
                }
                match self.read_local() {
                    Ok(Some(value)) => {
                        debug!(key = %self.key, "Loaded value from local store");
                        self.dirty.store(true, Ordering::SeqCst);
                        push_after_load = true;
                        value
                    }
                    Ok(None) => T::empty(),
                    Err(e) => {
                        warn!(key = %self.key, error = %e, "Local read failed, starting empty");
                        T::empty()
                    }
                }
            }
        };

        self.publish(value.clone());
        self.set_phase(SyncPhase::Ready);

        if push_after_load {
            // Runs once the caller releases the operation lock.
            let inner = Arc::clone(self);
            tokio::spawn(async move {
                let _guard = inner.op_lock.lock().await;
                let _ = inner.push_locked().await;
            });
        }
        value
    }

    fn schedule_push(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.debouncer.schedule(async move {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let _guard = inner.op_lock.lock().await;
            let _ = inner.push_locked().await;
        });
    }

    /// Schedule a push for an edit the remote has not seen yet, unless one
    /// is already waiting or the quota condition still holds.
    fn resume_pending_push(self: &Arc<Self>) {
        if self.phase() != SyncPhase::Ready
            || !self.dirty.load(Ordering::SeqCst)
            || self.quota_exceeded.load(Ordering::SeqCst)
            || self.debouncer.is_pending()
        {
            return;
        }
        debug!(key = %self.key, "Remote reachable again, resuming push");
        self.schedule_push();
    }

    async fn push_locked(&self) -> SyncResult<()> {
        if self.phase() != SyncPhase::Ready {
            debug!(key = %self.key, "Skipping push before load");
            return Ok(());
        }
        if self.quota_exceeded.load(Ordering::SeqCst) {
            debug!(key = %self.key, "Skipping push while over quota");
            return Err(SyncError::QuotaExceeded {
                key: self.key.clone(),
            });
        }

        let bytes = self.encode(&self.current())?;
        match self.remote.set(&self.key, bytes).await {
            Ok(()) => {
                if !self.remote.synchronize().await {
                    debug!(key = %self.key, "Remote synchronize made no progress");
                }
                self.dirty.store(false, Ordering::SeqCst);
                if let Ok(mut last) = self.last_push_error.write() {
                    *last = None;
                }
                debug!(key = %self.key, "Pushed value to remote store");
                Ok(())
            }
            Err(e) => {
                let err = e.for_key(&self.key);
                if matches!(err, SyncError::QuotaExceeded { .. }) {
                    self.quota_exceeded.store(true, Ordering::SeqCst);
                }
                warn!(key = %self.key, error = %err, "Remote push failed, local copy kept");
                if let Ok(mut last) = self.last_push_error.write() {
                    *last = Some(err.clone());
                }
                Err(err)
            }
        }
    }

    async fn handle_external_change(self: &Arc<Self>, change: &ExternalChange) {
        match change.reason {
            ChangeReason::QuotaViolation => {
                if !self.quota_exceeded.swap(true, Ordering::SeqCst) {
                    warn!(key = %self.key, "Remote store quota exceeded, pushes paused");
                }
            }
            ChangeReason::AccountChange => {
                self.clear_quota_flag();
                info!(key = %self.key, "Account changed, reloading");
                let _guard = self.op_lock.lock().await;
                self.load_locked().await;
            }
            ChangeReason::ServerChange | ChangeReason::InitialSync => {
                self.clear_quota_flag();
                if change.touches(&self.key) {
                    let _guard = self.op_lock.lock().await;
                    self.reconcile_locked().await;
                }
                // A notification means the remote is reachable again.
                self.resume_pending_push();
            }
        }
    }

    fn clear_quota_flag(&self) {
        if self.quota_exceeded.swap(false, Ordering::SeqCst) {
            debug!(key = %self.key, "Quota condition cleared");
        }
    }

    async fn reconcile_locked(&self) {
        match self.read_remote().await {
            Ok(Some(incoming)) => {
                let policy = T::merge_policy();
                match self.current().reconcile(incoming.clone()) {
                    Reconciliation::Unchanged => {
                        debug!(key = %self.key, ?policy, "Remote change already reflected");
                    }
                    Reconciliation::Adopt(value) => {
                        self.write_local(&value);
                        self.publish(value);
                        debug!(key = %self.key, ?policy, "Adopted remote change");
                    }
                }
                if self.current() == incoming {
                    self.dirty.store(false, Ordering::SeqCst);
                }
            }
            Ok(None) => {
                self.debouncer.cancel();
                self.dirty.store(false, Ordering::SeqCst);
                if let Err(e) = self.local.remove(&self.key) {
                    warn!(key = %self.key, error = %e, "Failed to remove local copy");
                }
                self.publish(T::empty());
                info!(key = %self.key, "Value cleared remotely");
            }
            Err(e) => {
                warn!(key = %self.key, error = %e, "Failed to read remote change, keeping current value");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::InMemoryKeyValueStore;
    use crate::sync::remote::InMemoryRemoteStore;
    use crate::sync::value::{ExcludedTags, SeenItems};

    const SEEN_KEY: &str = "seenItems";
    const TAGS_KEY: &str = "excludedTags";
    const DEBOUNCE: Duration = Duration::from_millis(1000);

    struct Fixture {
        local: Arc<InMemoryKeyValueStore>,
        remote: Arc<InMemoryRemoteStore>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                local: Arc::new(InMemoryKeyValueStore::new()),
                remote: Arc::new(InMemoryRemoteStore::new()),
            }
        }

        fn store<T: SyncedValue>(&self, key: &str) -> SyncedStateStore<T> {
            SyncedStateStore::new(key, self.local.clone(), self.remote.clone(), DEBOUNCE)
        }

        fn local_value(&self, key: &str) -> Option<Vec<u8>> {
            self.local.get(key).expect("local get should succeed")
        }
    }

    fn seen(ids: &[i64]) -> SeenItems {
        ids.iter().copied().collect()
    }

    fn server_change(key: &str) -> ExternalChange {
        ExternalChange::new(ChangeReason::ServerChange, [key])
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_prefers_remote_and_mirrors_locally() {
        let fx = Fixture::new();
        fx.remote.external_write(SEEN_KEY, b"[1]".to_vec());
        fx.local.set(SEEN_KEY, b"[2]").expect("local set should succeed");

        let store = fx.store::<SeenItems>(SEEN_KEY);
        assert_eq!(store.status().phase, SyncPhase::Uninitialized);

        let value = store.load().await;
        assert_eq!(value, seen(&[1]));
        assert_eq!(store.current(), seen(&[1]));
        assert_eq!(store.status().phase, SyncPhase::Ready);
        assert_eq!(fx.local_value(SEEN_KEY), Some(b"[1]".to_vec()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_falls_back_to_local_and_pushes_up() {
        let fx = Fixture::new();
        fx.local.set(SEEN_KEY, b"[1,2]").expect("local set should succeed");

        let store = fx.store::<SeenItems>(SEEN_KEY);
        assert_eq!(store.load().await, seen(&[1, 2]));

        settle().await;
        assert_eq!(fx.remote.write_count(SEEN_KEY), 1);
        assert_eq!(fx.remote.peek(SEEN_KEY), Some(b"[1,2]".to_vec()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_with_nothing_stored_is_empty() {
        let fx = Fixture::new();
        let store = fx.store::<ExcludedTags>(TAGS_KEY);

        assert_eq!(store.load().await, ExcludedTags::empty());
        settle().await;
        assert_eq!(fx.remote.write_count(TAGS_KEY), 0);
        assert!(fx.local.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_ignores_undecodable_remote() {
        let fx = Fixture::new();
        fx.remote.external_write(SEEN_KEY, b"not json".to_vec());
        fx.local.set(SEEN_KEY, b"[3]").expect("local set should succeed");

        let store = fx.store::<SeenItems>(SEEN_KEY);
        assert_eq!(store.load().await, seen(&[3]));

        // The local value replaces the broken remote copy.
        settle().await;
        assert_eq!(fx.remote.peek(SEEN_KEY), Some(b"[3]".to_vec()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_while_remote_unavailable() {
        let fx = Fixture::new();
        fx.remote.set_available(false);
        fx.local.set(SEEN_KEY, b"[4]").expect("local set should succeed");

        let store = fx.store::<SeenItems>(SEEN_KEY);
        assert_eq!(store.load().await, seen(&[4]));

        settle().await;
        assert!(matches!(
            store.status().last_push_error,
            Some(SyncError::RemoteUnavailable { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_notifies_observers() {
        let fx = Fixture::new();
        fx.remote.external_write(SEEN_KEY, b"[8]".to_vec());
        let store = fx.store::<SeenItems>(SEEN_KEY);
        let mut rx = store.subscribe();

        store.load().await;
        assert!(rx.has_changed().expect("sender should be alive"));
        assert_eq!(*rx.borrow_and_update(), seen(&[8]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_mutate_persists_locally_right_away() {
        let fx = Fixture::new();
        let store = fx.store::<SeenItems>(SEEN_KEY);
        store.load().await;

        let value = store.mutate(|s| {
            s.insert(7);
        })
        .await;
        assert_eq!(value, seen(&[7]));
        assert_eq!(fx.local_value(SEEN_KEY), Some(b"[7]".to_vec()));
        assert_eq!(fx.remote.write_count(SEEN_KEY), 0);
        assert!(store.status().push_pending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_of_mutations_pushes_once_with_last_value() {
        let fx = Fixture::new();
        let store = fx.store::<SeenItems>(SEEN_KEY);
        store.load().await;

        for id in 1..=5 {
            store.mutate(|s| {
                s.insert(id);
            })
            .await;
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        tokio::time::sleep(Duration::from_millis(2000)).await;

        let writes = fx.remote.writes_for(SEEN_KEY);
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0], b"[1,2,3,4,5]".to_vec());
        assert!(fx.remote.synchronize_calls() >= 1);
        assert!(!store.status().push_pending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spaced_mutations_push_separately() {
        let fx = Fixture::new();
        let store = fx.store::<SeenItems>(SEEN_KEY);
        store.load().await;

        store.mutate(|s| {
            s.insert(1);
        })
        .await;
        tokio::time::sleep(Duration::from_millis(1500)).await;
        store.mutate(|s| {
            s.insert(2);
        })
        .await;
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert_eq!(fx.remote.write_count(SEEN_KEY), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unchanged_mutation_is_a_no_op() {
        let fx = Fixture::new();
        let store = fx.store::<SeenItems>(SEEN_KEY);
        store.load().await;
        let mut rx = store.subscribe();
        rx.borrow_and_update();

        store.mutate(|_| {}).await;
        tokio::time::sleep(Duration::from_millis(2000)).await;

        assert!(!rx.has_changed().expect("sender should be alive"));
        assert_eq!(fx.remote.write_count(SEEN_KEY), 0);
        assert!(fx.local.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_pushes_immediately_and_cancels_timer() {
        let fx = Fixture::new();
        let store = fx.store::<ExcludedTags>(TAGS_KEY);
        store.load().await;

        store.mutate(|tags| {
            tags.add("repost");
        })
        .await;
        store.flush().await.expect("flush should succeed");
        assert_eq!(fx.remote.write_count(TAGS_KEY), 1);

        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert_eq!(fx.remote.write_count(TAGS_KEY), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_union_merge_adopts_only_growth() {
        let fx = Fixture::new();
        fx.remote.external_write(SEEN_KEY, b"[1,2]".to_vec());
        let store = fx.store::<SeenItems>(SEEN_KEY);
        store.load().await;
        let mut rx = store.subscribe();
        rx.borrow_and_update();

        fx.remote.external_write(SEEN_KEY, b"[2,3]".to_vec());
        store.handle_external_change(&server_change(SEEN_KEY)).await;

        assert_eq!(store.current(), seen(&[1, 2, 3]));
        assert_eq!(fx.local_value(SEEN_KEY), Some(b"[1,2,3]".to_vec()));
        assert!(rx.has_changed().expect("sender should be alive"));
        rx.borrow_and_update();

        // Seeing the same remote value again changes nothing.
        store.handle_external_change(&server_change(SEEN_KEY)).await;
        assert!(!rx.has_changed().expect("sender should be alive"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_replace_merge_discards_unpushed_edits() {
        let fx = Fixture::new();
        let store = fx.store::<ExcludedTags>(TAGS_KEY);
        store.load().await;
        store.mutate(|tags| {
            tags.add("repost");
        })
        .await;

        fx.remote.external_write(
            TAGS_KEY,
            br#"[{"tag":"politics","enabled":false}]"#.to_vec(),
        );
        store
            .handle_external_change(&ExternalChange::new(ChangeReason::InitialSync, [TAGS_KEY]))
            .await;

        let current = store.current();
        assert_eq!(current.len(), 1);
        assert_eq!(current.tags()[0].tag, "politics");
        assert!(!current.is_excluded("repost"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_clear_empties_value_and_local_copy() {
        let fx = Fixture::new();
        fx.remote.external_write(SEEN_KEY, b"[1,2]".to_vec());
        let store = fx.store::<SeenItems>(SEEN_KEY);
        store.load().await;

        fx.remote.external_remove(SEEN_KEY);
        store.handle_external_change(&server_change(SEEN_KEY)).await;

        assert_eq!(store.current(), SeenItems::empty());
        assert_eq!(fx.local_value(SEEN_KEY), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_for_other_key_is_ignored() {
        let fx = Fixture::new();
        fx.remote.external_write(SEEN_KEY, b"[1]".to_vec());
        let store = fx.store::<SeenItems>(SEEN_KEY);
        store.load().await;

        fx.remote.external_write(SEEN_KEY, b"[1,99]".to_vec());
        store.handle_external_change(&server_change(TAGS_KEY)).await;
        assert_eq!(store.current(), seen(&[1]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_account_change_reloads() {
        let fx = Fixture::new();
        fx.remote.external_write(SEEN_KEY, b"[1]".to_vec());
        let store = fx.store::<SeenItems>(SEEN_KEY);
        store.load().await;

        // Another account's data replaces ours rather than merging into it.
        fx.remote.external_write(SEEN_KEY, b"[9]".to_vec());
        store
            .handle_external_change(&ExternalChange::new(
                ChangeReason::AccountChange,
                Vec::<String>::new(),
            ))
            .await;
        assert_eq!(store.current(), seen(&[9]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_quota_violation_pauses_pushes_until_cleared() {
        let fx = Fixture::new();
        let store = fx.store::<SeenItems>(SEEN_KEY);
        store.load().await;

        store
            .handle_external_change(&ExternalChange::new(
                ChangeReason::QuotaViolation,
                [SEEN_KEY],
            ))
            .await;
        assert!(store.status().quota_exceeded);

        store.mutate(|s| {
            s.insert(1);
        })
        .await;
        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert_eq!(fx.remote.write_count(SEEN_KEY), 0);
        assert_eq!(fx.local_value(SEEN_KEY), Some(b"[1]".to_vec()));

        // A later healthy notification clears the condition and the held
        // back edit goes out on its own.
        store.handle_external_change(&server_change(TAGS_KEY)).await;
        assert!(!store.status().quota_exceeded);
        assert!(store.status().push_pending);
        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert_eq!(fx.remote.writes_for(SEEN_KEY), vec![b"[1]".to_vec()]);
        assert_eq!(store.status().last_push_error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clearing_quota_warning_resumes_push() {
        let fx = Fixture::new();
        let store = fx.store::<ExcludedTags>(TAGS_KEY);
        store.load().await;
        fx.remote.set_quota_exceeded(true);

        store.mutate(|tags| {
            tags.add("repost");
        })
        .await;
        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert!(store.status().quota_exceeded);
        assert_eq!(fx.remote.write_count(TAGS_KEY), 0);

        fx.remote.set_quota_exceeded(false);
        store.clear_quota_warning();
        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert_eq!(fx.remote.write_count(TAGS_KEY), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_push_failed_during_outage_resumes_on_contact() {
        let fx = Fixture::new();
        let store = fx.store::<SeenItems>(SEEN_KEY);
        store.load().await;
        fx.remote.set_available(false);

        store.mutate(|s| {
            s.insert(1);
        })
        .await;
        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert_eq!(fx.remote.write_count(SEEN_KEY), 0);
        assert!(matches!(
            store.status().last_push_error,
            Some(SyncError::RemoteUnavailable { .. })
        ));

        fx.remote.set_available(true);
        store.handle_external_change(&server_change(TAGS_KEY)).await;
        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert_eq!(fx.remote.writes_for(SEEN_KEY), vec![b"[1]".to_vec()]);
        assert_eq!(store.status().last_push_error, None);

        // Once the remote has caught up, further contact pushes nothing.
        store.handle_external_change(&server_change(TAGS_KEY)).await;
        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert_eq!(fx.remote.write_count(SEEN_KEY), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quota_error_on_push_sets_flag() {
        let fx = Fixture::new();
        let store = fx.store::<SeenItems>(SEEN_KEY);
        store.load().await;
        fx.remote.set_quota_exceeded(true);

        store.mutate(|s| {
            s.insert(1);
        })
        .await;
        let err = store.flush().await.expect_err("flush should fail over quota");
        assert!(matches!(err, SyncError::QuotaExceeded { .. }));

        let status = store.status();
        assert!(status.quota_exceeded);
        assert!(matches!(
            status.last_push_error,
            Some(SyncError::QuotaExceeded { .. })
        ));

        fx.remote.set_quota_exceeded(false);
        store.clear_quota_warning();
        store.flush().await.expect("flush should succeed");
        assert_eq!(store.status().last_push_error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_listen_applies_remote_changes() {
        let fx = Fixture::new();
        let store = fx.store::<SeenItems>(SEEN_KEY);
        store.load().await;
        store.listen();

        fx.remote.external_write(SEEN_KEY, b"[5,6]".to_vec());
        settle().await;
        assert_eq!(store.current(), seen(&[5, 6]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_pending_push() {
        let fx = Fixture::new();
        let store = fx.store::<SeenItems>(SEEN_KEY);
        store.load().await;
        store.listen();

        store.mutate(|s| {
            s.insert(1);
        })
        .await;
        store.shutdown();
        assert!(!store.status().push_pending);

        fx.remote.external_write(SEEN_KEY, b"[2]".to_vec());
        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert_eq!(fx.remote.write_count(SEEN_KEY), 0);
        assert_eq!(store.current(), seen(&[1]), "listener should be stopped");
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_pending_push() {
        let fx = Fixture::new();
        {
            let store = fx.store::<SeenItems>(SEEN_KEY);
            store.load().await;
            store.mutate(|s| {
                s.insert(1);
            })
            .await;
        }
        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert_eq!(fx.remote.write_count(SEEN_KEY), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_clears_every_copy() {
        let fx = Fixture::new();
        fx.remote.external_write(SEEN_KEY, b"[1,2]".to_vec());
        let store = fx.store::<SeenItems>(SEEN_KEY);
        store.load().await;

        store.reset().await;
        assert_eq!(store.current(), SeenItems::empty());
        assert_eq!(fx.local_value(SEEN_KEY), None);
        assert_eq!(fx.remote.peek(SEEN_KEY), None);
    }
}
