//! Trailing-edge debounce for remote pushes.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;

/// A scheduled action that has not fired yet.
struct PendingAction {
    generation: u64,
    cancel: oneshot::Sender<()>,
}

#[derive(Default)]
struct Slot {
    generation: u64,
    pending: Option<PendingAction>,
}

/// Runs the most recently scheduled action once no new action has been
/// scheduled for `delay`.
///
/// Scheduling replaces (and cancels) whatever was pending. Cancelling only
/// affects actions that have not started; an action already running
/// completes.
pub struct Debouncer {
    delay: Duration,
    slot: Arc<Mutex<Slot>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            slot: Arc::new(Mutex::new(Slot::default())),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedule `action` to run after the quiet interval.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule<F>(&self, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let generation = {
            let Ok(mut slot) = self.slot.lock() else {
                return;
            };
            slot.generation += 1;
            let generation = slot.generation;
            // Dropping the previous sender wakes its task with an error,
            // which cancels it.
            slot.pending = Some(PendingAction {
                generation,
                cancel: cancel_tx,
            });
            generation
        };

        let delay = self.delay;
        let slot = Arc::clone(&self.slot);
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = cancel_rx => return,
                _ = tokio::time::sleep(delay) => {}
            }
            // Replaced or cancelled after the interval elapsed.
            {
                let Ok(mut slot) = slot.lock() else {
                    return;
                };
                if slot.pending.as_ref().map(|p| p.generation) != Some(generation) {
                    return;
                }
                slot.pending = None;
            }
            action.await;
        });
    }

    /// Cancel the pending action. Returns true if one was pending.
    pub fn cancel(&self) -> bool {
        let pending = self.slot.lock().ok().and_then(|mut slot| slot.pending.take());
        match pending {
            Some(pending) => {
                let _ = pending.cancel.send(());
                true
            }
            None => false,
        }
    }

    /// Whether an action is waiting for its quiet interval.
    pub fn is_pending(&self) -> bool {
        self.slot
            .lock()
            .map(|slot| slot.pending.is_some())
            .unwrap_or(false)
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for Debouncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Debouncer")
            .field("delay", &self.delay)
            .field("pending", &self.is_pending())
            .finish()
    }
}
