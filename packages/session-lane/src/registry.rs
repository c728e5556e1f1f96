//! Lock registry - the only shared mutable state of the serializer.
//!
//! Maps a session key to the most recently registered pending operation for
//! that key. An absent entry means the key is idle.
//!
//! ```text
//! register(k) ──► swap entry for k, remember the previous one
//!                       │
//!                       ▼
//!             await previous.settled
//!                       │
//!                       ▼
//!                  run operation
//!                       │
//!                       ▼
//! release(k, id) ──► remove entry for k only if it is still ours
//! ```
//!
//! Both mutations are single indivisible DashMap operations. The identity
//! check in `release` keeps a slow earlier operation from evicting a later
//! one that replaced it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::debug;

use crate::key::SessionKey;

/// Resolves once an operation and everything queued before it have settled.
pub(crate) type Settled = Shared<BoxFuture<'static, ()>>;

/// Distinguishes a pending operation from later ones under the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct OperationId(u64);

struct PendingOperation {
    id: OperationId,
    settled: Settled,
}

/// Process-wide map from session key to its current pending operation.
#[derive(Default)]
pub struct LockRegistry {
    entries: DashMap<SessionKey, PendingOperation>,
    next_id: AtomicU64,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys with in-flight or queued work.
    pub fn active_count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_active(&self, key: &SessionKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Register a new pending operation for `key`, returning its id, the
    /// settlement of the operation it replaced, and the sender whose drop
    /// marks the new operation as settled.
    fn register(&self, key: &SessionKey) -> (OperationId, Option<Settled>, oneshot::Sender<()>) {
        let id = OperationId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (done_tx, done_rx) = oneshot::channel::<()>();

        let previous = match self.entries.entry(key.clone()) {
            Entry::Occupied(mut slot) => {
                let previous = slot.get().settled.clone();
                slot.insert(PendingOperation {
                    id,
                    settled: settled_after(Some(previous.clone()), done_rx),
                });
                Some(previous)
            }
            Entry::Vacant(slot) => {
                slot.insert(PendingOperation {
                    id,
                    settled: settled_after(None, done_rx),
                });
                None
            }
        };

        (id, previous, done_tx)
    }

    /// Remove the entry for `key` if it still belongs to `id`.
    ///
    /// Returns false when a later operation has since replaced it.
    fn release(&self, key: &SessionKey, id: OperationId) -> bool {
        self.entries
            .remove_if(key, |_, pending| pending.id == id)
            .is_some()
    }
}

/// An operation settles when its predecessor has settled and its own
/// completion sender is gone. Chaining on the predecessor keeps FIFO intact
/// when an operation is abandoned while still queued.
fn settled_after(previous: Option<Settled>, done: oneshot::Receiver<()>) -> Settled {
    async move {
        if let Some(previous) = previous {
            previous.await;
        }
        // Err just means the sender was dropped, which is the signal.
        let _ = done.await;
    }
    .boxed()
    .shared()
}

// =============================================================================
// Lease
// =============================================================================

/// RAII handle on a key's slot in the registry.
///
/// Created at registration, dropped on every exit path (success, failure,
/// panic, cancellation). Dropping it settles the operation and deregisters it
/// if it is still current.
pub(crate) struct KeyLease {
    registry: Arc<LockRegistry>,
    key: SessionKey,
    id: OperationId,
    /// Predecessor still to wait for. `None` once the turn has started.
    waiting_on: Option<Settled>,
    /// Runtime the lease was acquired on; deferred releases go there even if
    /// the lease is dropped from another thread.
    runtime: Option<Handle>,
    _done: oneshot::Sender<()>,
}

impl KeyLease {
    pub(crate) fn acquire(registry: Arc<LockRegistry>, key: SessionKey) -> Self {
        let (id, previous, done) = registry.register(&key);
        if previous.is_some() {
            debug!(session_key = %key, "operation queued behind in-flight work");
        }
        Self {
            registry,
            key,
            id,
            waiting_on: previous,
            runtime: Handle::try_current().ok(),
            _done: done,
        }
    }

    pub(crate) fn key(&self) -> &SessionKey {
        &self.key
    }

    /// Wait until every operation registered earlier for this key has settled.
    pub(crate) async fn wait_turn(&mut self) {
        if let Some(previous) = &self.waiting_on {
            previous.clone().await;
        }
        self.waiting_on = None;
    }
}

impl Drop for KeyLease {
    fn drop(&mut self) {
        let pending_predecessor = self
            .waiting_on
            .take()
            .filter(|previous| previous.peek().is_none());

        let Some(previous) = pending_predecessor else {
            self.registry.release(&self.key, self.id);
            return;
        };

        // Abandoned while queued behind a live operation: the entry must
        // outlive that operation or the key would look idle while it runs.
        let registry = self.registry.clone();
        let key = self.key.clone();
        let id = self.id;
        debug!(session_key = %key, "queued operation abandoned, deferring release");
        let deferred = async move {
            previous.await;
            registry.release(&key, id);
        };

        match Handle::try_current().ok().or_else(|| self.runtime.clone()) {
            Some(handle) => {
                handle.spawn(deferred);
            }
            None => {
                // Settlement only waits on oneshot channels, so it does not
                // need a tokio runtime to resolve.
                std::thread::spawn(move || futures::executor::block_on(deferred));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn test_register_on_idle_key_has_no_predecessor() {
        let registry = LockRegistry::new();
        let key = SessionKey::new("k");

        let (_, previous, _done) = registry.register(&key);

        assert!(previous.is_none());
        assert!(registry.is_active(&key));
        assert_eq!(registry.active_count(), 1);
    }

    #[test]
    fn test_release_is_identity_checked() {
        let registry = LockRegistry::new();
        let key = SessionKey::new("k");

        let (first, _, _first_done) = registry.register(&key);
        let (second, previous, _second_done) = registry.register(&key);
        assert!(previous.is_some());

        // The earlier operation finishing must not evict the later one.
        assert!(!registry.release(&key, first));
        assert!(registry.is_active(&key));

        assert!(registry.release(&key, second));
        assert!(!registry.is_active(&key));
    }

    #[test]
    fn test_distinct_keys_do_not_chain() {
        let registry = LockRegistry::new();

        let (_, a_prev, _a) = registry.register(&SessionKey::new("a"));
        let (_, b_prev, _b) = registry.register(&SessionKey::new("b"));

        assert!(a_prev.is_none());
        assert!(b_prev.is_none());
        assert_eq!(registry.active_count(), 2);
    }

    #[test]
    fn test_queued_lease_dropped_without_runtime_waits_for_predecessor() {
        let registry = Arc::new(LockRegistry::new());
        let key = SessionKey::new("k");

        let running = KeyLease::acquire(registry.clone(), key.clone());
        let queued = KeyLease::acquire(registry.clone(), key.clone());
        drop(queued);

        std::thread::sleep(Duration::from_millis(20));
        assert!(registry.is_active(&key), "key released while predecessor runs");

        drop(running);
        let deadline = Instant::now() + Duration::from_secs(5);
        while registry.is_active(&key) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(!registry.is_active(&key));
    }

    #[tokio::test(start_paused = true)]
    async fn test_settled_waits_for_predecessor_and_own_completion() {
        let registry = LockRegistry::new();
        let key = SessionKey::new("k");

        let (_, _, first_done) = registry.register(&key);
        let (_, first_settled, second_done) = registry.register(&key);
        let (_, second_settled, _third_done) = registry.register(&key);
        let first_settled = first_settled.unwrap();
        let second_settled = second_settled.unwrap();

        // Second finishes before first: its settlement still waits for first.
        drop(second_done);
        let early = tokio::time::timeout(
            Duration::from_millis(50),
            second_settled.clone(),
        )
        .await;
        assert!(early.is_err());

        drop(first_done);
        first_settled.await;
        second_settled.await;
    }
}
