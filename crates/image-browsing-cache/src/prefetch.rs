//! Best-effort background warming of folder listings
//!
//! Paths wait in one priority queue (lower number first, then insertion
//! order) and are drained by at most `concurrency` worker tasks. Queuing a
//! path that is already waiting at a lower priority moves it forward. Workers
//! re-check the cache before reading, since a foreground visit may have
//! warmed the path in the meantime. Failures are logged and dropped; nothing
//! is retried.

use crate::conditional::ConditionalTransport;
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Children of the folder just opened, or a hovered folder
pub const PRIORITY_URGENT: u8 = 0;

/// Counters for the scheduler
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PrefetchStats {
    pub queued: usize,
    pub in_flight: usize,
    pub completed: u64,
    pub failed: u64,
    pub skipped: u64,
}

#[derive(Clone)]
pub struct PrefetchScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    conditional: Arc<ConditionalTransport>,
    concurrency: usize,
    state: Mutex<QueueState>,
    idle: Notify,
}

#[derive(Default)]
struct QueueState {
    queue: BinaryHeap<Reverse<(u8, u64, String)>>,
    /// Waiting paths and the sequence number of their live heap entry.
    /// Heap entries with any other sequence number were superseded by a promotion.
    queued: HashMap<String, (u8, u64)>,
    in_flight: HashSet<String>,
    workers: usize,
    next_seq: u64,
    completed: u64,
    failed: u64,
    skipped: u64,
}

impl SchedulerInner {
    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Take the next path that still needs a read, or retire the worker
    fn next_task(&self) -> Option<String> {
        let mut state = self.state();
        while let Some(Reverse((_, seq, path))) = state.queue.pop() {
            if state.queued.get(&path).map(|&(_, live)| live) != Some(seq) {
                continue;
            }
            state.queued.remove(&path);
            if self.conditional.store().is_fresh(&path) {
                debug!(path = %path, "Prefetch skipped, already cached");
                state.skipped += 1;
                continue;
            }
            state.in_flight.insert(path.clone());
            return Some(path);
        }

        state.workers -= 1;
        if state.workers == 0 {
            self.idle.notify_waiters();
        }
        None
    }

    fn finish(&self, path: &str, ok: bool) {
        let mut state = self.state();
        state.in_flight.remove(path);
        if ok {
            state.completed += 1;
        } else {
            state.failed += 1;
        }
    }
}

async fn worker(inner: Arc<SchedulerInner>) {
    while let Some(path) = inner.next_task() {
        match inner.conditional.read(&path, false).await {
            Ok(_) => {
                debug!(path = %path, "Prefetched listing");
                inner.finish(&path, true);
            }
            Err(e) => {
                debug!(path = %path, error = %e, "Prefetch failed");
                inner.finish(&path, false);
            }
        }
    }
}

impl PrefetchScheduler {
    pub fn new(conditional: Arc<ConditionalTransport>, concurrency: usize) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                conditional,
                concurrency: concurrency.max(1),
                state: Mutex::default(),
                idle: Notify::new(),
            }),
        }
    }

    /// Queue `paths` at `priority`, returning how many were accepted.
    ///
    /// Paths that are fresh in the cache or already being read are skipped.
    /// A path already queued at a higher priority number is moved up to
    /// `priority` and counts as accepted. Must be called from within a Tokio
    /// runtime.
    pub fn enqueue<I>(&self, paths: I, priority: u8) -> usize
    where
        I: IntoIterator<Item = String>,
    {
        let store = self.inner.conditional.store();
        let mut state = self.inner.state();
        let mut accepted = 0;

        for path in paths {
            if state.in_flight.contains(&path) {
                continue;
            }
            match state.queued.get(&path) {
                Some(&(queued_at, _)) if queued_at <= priority => continue,
                Some(_) => debug!(path = %path, priority, "Prefetch promoted"),
                None if store.is_fresh(&path) => {
                    state.skipped += 1;
                    continue;
                }
                None => {}
            }
            let seq = state.next_seq;
            state.next_seq += 1;
            state.queued.insert(path.clone(), (priority, seq));
            state.queue.push(Reverse((priority, seq, path)));
            accepted += 1;
        }

        let wanted = self
            .inner
            .concurrency
            .saturating_sub(state.workers)
            .min(state.queued.len());
        if wanted == 0 {
            return accepted;
        }

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                warn!(error = %e, "No runtime available, prefetch left queued");
                return accepted;
            }
        };
        for _ in 0..wanted {
            state.workers += 1;
            handle.spawn(worker(Arc::clone(&self.inner)));
        }
        debug!(accepted, priority, workers = state.workers, "Queued prefetch");
        accepted
    }

    /// Drop every queued path that has not started yet
    pub fn clear_pending(&self) -> usize {
        let mut state = self.inner.state();
        let dropped = state.queued.len();
        state.queue.clear();
        state.queued.clear();
        dropped
    }

    pub fn is_pending(&self, path: &str) -> bool {
        let state = self.inner.state();
        state.queued.contains_key(path) || state.in_flight.contains(path)
    }

    pub fn is_idle(&self) -> bool {
        let state = self.inner.state();
        state.workers == 0 && state.queued.is_empty()
    }

    /// Wait until the queue is empty and every worker has finished
    pub async fn drained(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }

    pub fn stats(&self) -> PrefetchStats {
        let state = self.inner.state();
        PrefetchStats {
            queued: state.queued.len(),
            in_flight: state.in_flight.len(),
            completed: state.completed,
            failed: state.failed,
            skipped: state.skipped,
        }
    }
}
