//! Named cancellation slots
//!
//! Starting an operation under a name cancels whatever was running under
//! that name. Each run gets a fresh [`CancellationToken`]; tokens are never
//! reused, so a superseded operation can never observe a later run's signal.

use crate::error::{CacheError, Result};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Slot used for the one in-flight foreground folder read
pub const NAVIGATION_SLOT: &str = "navigation";

#[derive(Default)]
pub struct CancellationRegistry {
    slots: Mutex<HashMap<String, (u64, CancellationToken)>>,
    next_id: AtomicU64,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, (u64, CancellationToken)>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `operation` as the current holder of `name`.
    ///
    /// Resolves to [`CacheError::Cancelled`] as soon as a later `run` or
    /// [`cancel`](Self::cancel) targets the same name, dropping the
    /// operation's future. The operation also receives the token so it can
    /// stop cooperatively.
    pub async fn run<F, Fut, T>(&self, name: &str, operation: F) -> Result<T>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();

        let previous = self.slots().insert(name.to_string(), (id, token.clone()));
        if let Some((_, previous)) = previous {
            debug!(slot = name, "Cancelling superseded operation");
            previous.cancel();
        }

        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => Err(CacheError::Cancelled),
            result = operation(token.clone()) => result,
        };

        let mut slots = self.slots();
        if slots.get(name).map(|(current, _)| *current) == Some(id) {
            slots.remove(name);
        }
        outcome
    }

    /// Cancel the operation running under `name`, if any
    pub fn cancel(&self, name: &str) -> bool {
        match self.slots().remove(name) {
            Some((_, token)) => {
                debug!(slot = name, "Cancelled operation");
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.slots().contains_key(name)
    }
}
