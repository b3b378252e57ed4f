//! Collapses concurrent identical requests into one in-flight operation.
//!
//! The first caller for a key starts the operation and registers a weak
//! handle to it; later callers upgrade that handle and await the same
//! [`Shared`] future, so every waiter observes the same value or error. The
//! registration is removed as soon as the operation settles. Because the
//! registry only holds weak handles, an operation whose waiters have all been
//! dropped is dropped with them, which is how a cancelled read aborts the
//! underlying request.

use futures::future::{BoxFuture, Shared, WeakShared};
use futures::FutureExt as _;
use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

type SharedOp<V, E> = Shared<BoxFuture<'static, Result<V, E>>>;

struct Registration<V, E> {
    id: u64,
    op: WeakShared<BoxFuture<'static, Result<V, E>>>,
}

type Registry<K, V, E> = Arc<Mutex<HashMap<K, Registration<V, E>>>>;

pub struct Deduplicator<K, V, E> {
    inflight: Registry<K, V, E>,
    next_id: AtomicU64,
}

impl<K, V, E> Default for Deduplicator<K, V, E> {
    fn default() -> Self {
        Self {
            inflight: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }
}

fn lock<K, V, E>(registry: &Registry<K, V, E>) -> MutexGuard<'_, HashMap<K, Registration<V, E>>> {
    registry
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<K, V, E> Deduplicator<K, V, E>
where
    K: Eq + Hash + Clone + Debug + Send + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `operation` under `key`, or join the one already outstanding.
    ///
    /// Registration happens synchronously, before the returned future is
    /// first polled.
    pub fn run<F, Fut>(
        &self,
        key: K,
        operation: F,
    ) -> impl Future<Output = Result<V, E>> + Send + 'static
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let mut inflight = lock(&self.inflight);

        if let Some(existing) = inflight.get(&key).and_then(|reg| reg.op.upgrade()) {
            debug!(key = ?key, "Joining in-flight request");
            return existing;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let registry = Arc::clone(&self.inflight);
        let settled_key = key.clone();
        let fut = operation();
        let op: SharedOp<V, E> = async move {
            let outcome = fut.await;
            let mut inflight = lock(&registry);
            if inflight.get(&settled_key).map(|reg| reg.id) == Some(id) {
                inflight.remove(&settled_key);
            }
            outcome
        }
        .boxed()
        .shared();

        // Drop registrations whose waiters all went away before settling
        inflight.retain(|_, reg| reg.op.upgrade().is_some());

        // A fresh, never-polled Shared always downgrades
        if let Some(weak) = op.downgrade() {
            inflight.insert(key, Registration { id, op: weak });
        }
        op
    }

    /// Whether an operation for `key` is currently outstanding
    pub fn is_in_flight(&self, key: &K) -> bool {
        lock(&self.inflight)
            .get(key)
            .is_some_and(|reg| reg.op.upgrade().is_some())
    }

    /// Number of outstanding operations
    pub fn len(&self) -> usize {
        lock(&self.inflight)
            .values()
            .filter(|reg| reg.op.upgrade().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
