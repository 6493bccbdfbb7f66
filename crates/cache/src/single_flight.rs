//! A keyed single-flight coordinator.

use crate::error::{CacheError, CacheResult};
use futures::FutureExt;
use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;

type Outcome<V> = CacheResult<V>;
type OutcomeReceiver<V> = watch::Receiver<Option<Outcome<V>>>;

/// Collapses concurrent lookups for the same key into one resolution.
///
/// The first caller for a key spawns its resolver; everyone else waits on
/// the same completion signal and observes the same outcome. Outcomes are
/// memoized for the life of the lock, errors included, so a failed key
/// doesn't turn into a retry storm.
///
/// Cancellation is per waiter: a cancelled waiter leaves immediately with
/// [`CacheError::Cancelled`] while the resolver runs to completion and its
/// result is still recorded. A panicking resolver is reported to every
/// waiter as [`CacheError::ResolvePanicked`].
pub struct TaskLock<K, V> {
    entries: Mutex<HashMap<K, OutcomeReceiver<V>>>,
}

impl<K, V> TaskLock<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Look up `key`, resolving it with `resolve` if this is the first call
    /// for that key.
    pub async fn lookup<F, Fut>(
        &self,
        cancel: &CancellationToken,
        key: K,
        resolve: F,
    ) -> CacheResult<V>
    where
        F: FnOnce(K) -> Fut + Send + 'static,
        Fut: Future<Output = CacheResult<V>> + Send + 'static,
    {
        let mut rx = self.entry(key, resolve).await;

        loop {
            let existing = rx.borrow_and_update().as_ref().cloned();
            if let Some(outcome) = existing {
                return outcome;
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(CacheError::Cancelled),
                changed = rx.changed() => {
                    if changed.is_err() {
                        // The resolver task was torn down before installing a
                        // result. Only happens on runtime shutdown; report it
                        // the same way as any other abnormal exit.
                        return Err(CacheError::ResolvePanicked);
                    }
                }
            }
        }
    }

    /// Get the completion handle for `key`, spawning the resolver when the
    /// key is new. The map lock is never held across an await of the
    /// resolver itself.
    async fn entry<F, Fut>(&self, key: K, resolve: F) -> OutcomeReceiver<V>
    where
        F: FnOnce(K) -> Fut + Send + 'static,
        Fut: Future<Output = CacheResult<V>> + Send + 'static,
    {
        let mut entries = self.entries.lock().await;

        if let Some(rx) = entries.get(&key) {
            return rx.clone();
        }

        let (tx, rx) = watch::channel(None);
        entries.insert(key.clone(), rx.clone());

        tokio::spawn(async move {
            let log_key = key.clone();
            let result = AssertUnwindSafe(async move { resolve(key).await })
                .catch_unwind()
                .await;

            let outcome = match result {
                Ok(outcome) => outcome,
                Err(panic) => {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "non-string panic payload".to_string());
                    tracing::error!(
                        key = ?log_key,
                        panic = %message,
                        "Panicked while resolving a cache entry"
                    );
                    Err(CacheError::ResolvePanicked)
                }
            };

            // Waiters may all be gone already; the outcome stays memoized
            // either way.
            let _ = tx.send(Some(outcome));
        });

        rx
    }
}

impl<K, V> Default for TaskLock<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
