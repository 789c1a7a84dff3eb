//! Keyed, cancellable timers.
//!
//! Each key owns at most one pending timer. Scheduling a key again replaces
//! its pending timer. A timer leaves the pending set the moment it fires,
//! before its task starts running, so a running task can schedule its own
//! key again.

use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::trace;

struct Timer {
    generation: u64,
    handle: JoinHandle<()>,
}

type TimerMap<K> = Arc<Mutex<HashMap<K, Timer>>>;

fn lock<K>(timers: &Mutex<HashMap<K, Timer>>) -> MutexGuard<'_, HashMap<K, Timer>> {
    timers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Registry of named debounce timers on the tokio runtime.
pub struct Debouncer<K> {
    timers: TimerMap<K>,
    generation: AtomicU64,
}

impl<K> Default for Debouncer<K> {
    fn default() -> Self {
        Self {
            timers: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
        }
    }
}

impl<K> Debouncer<K>
where
    K: Eq + Hash + Clone + Debug + Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` after `delay`, replacing any pending timer for `key`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule<F>(&self, key: K, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let timers = Arc::clone(&self.timers);
        let fired_key = key.clone();

        // held across spawn so a zero delay cannot fire before insertion
        let mut pending = lock(&self.timers);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut pending = lock(&timers);
                match pending.get(&fired_key) {
                    Some(timer) if timer.generation == generation => {
                        pending.remove(&fired_key);
                    }
                    _ => return,
                }
            }
            trace!(key = ?fired_key, "timer fired");
            task.await;
        });

        if let Some(previous) = pending.insert(key, Timer { generation, handle }) {
            previous.handle.abort();
        }
    }

    /// Cancel the pending timer for `key`. Returns whether one was pending.
    pub fn cancel(&self, key: &K) -> bool {
        match lock(&self.timers).remove(key) {
            Some(timer) => {
                timer.handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, key: &K) -> bool {
        lock(&self.timers).contains_key(key)
    }

    pub fn cancel_all(&self) {
        for (_, timer) in lock(&self.timers).drain() {
            timer.handle.abort();
        }
    }
}

impl<K> Drop for Debouncer<K> {
    fn drop(&mut self) {
        for (_, timer) in lock(&self.timers).drain() {
            timer.handle.abort();
        }
    }
}
