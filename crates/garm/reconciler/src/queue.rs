//! Keyed work queue
//!
//! Guarantees at most one in-flight pass per key. A key added while it is
//! being processed is parked and re-queued once the worker calls
//! [`WorkQueue::done`]. Failed keys are re-added after an exponential
//! backoff tracked per key. Each key has at most one pending delayed
//! re-add, the earliest requested.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::{HashSet, VecDeque};
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::trace;

/// Backoff bounds for failed keys
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            max: Duration::from_secs(300),
        }
    }
}

impl Backoff {
    /// Delay before retry number `failures` (1-based)
    pub fn delay(&self, failures: u32) -> Duration {
        let exp = failures.saturating_sub(1).min(20);
        self.base
            .checked_mul(1u32 << exp)
            .unwrap_or(self.max)
            .min(self.max)
    }
}

#[derive(Debug)]
struct State<K> {
    queue: VecDeque<K>,
    queued: HashSet<K>,
    processing: HashSet<K>,
    dirty: HashSet<K>,
    shutting_down: bool,
}

impl<K> Default for State<K> {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
            queued: HashSet::new(),
            processing: HashSet::new(),
            dirty: HashSet::new(),
            shutting_down: false,
        }
    }
}

#[derive(Debug)]
struct Inner<K: Eq + Hash> {
    state: Mutex<State<K>>,
    notify: Notify,
    failures: DashMap<K, u32>,
    /// Pending delayed re-add per key: deadline and the timer that owns it
    delayed: DashMap<K, (Instant, u64)>,
    timers: AtomicU64,
    backoff: Backoff,
}

/// Cloneable handle to a shared queue
#[derive(Debug)]
pub struct WorkQueue<K: Eq + Hash> {
    inner: Arc<Inner<K>>,
}

impl<K: Eq + Hash> Clone for WorkQueue<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K> WorkQueue<K>
where
    K: Clone + Eq + Hash + Send + Sync + std::fmt::Debug + 'static,
{
    pub fn new(backoff: Backoff) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                notify: Notify::new(),
                failures: DashMap::new(),
                delayed: DashMap::new(),
                timers: AtomicU64::new(0),
                backoff,
            }),
        }
    }

    /// Enqueue a key unless it is already waiting
    pub async fn add(&self, key: K) {
        let mut state = self.inner.state.lock().await;
        if state.shutting_down {
            return;
        }
        if state.processing.contains(&key) {
            trace!(?key, "Key in flight, parking");
            state.dirty.insert(key);
            return;
        }
        if state.queued.insert(key.clone()) {
            state.queue.push_back(key);
            drop(state);
            self.inner.notify.notify_one();
        }
    }

    /// Enqueue a key after `delay`
    ///
    /// An already pending re-add that is due no later wins; otherwise this
    /// one replaces it.
    pub fn add_after(&self, key: K, delay: Duration) {
        let deadline = Instant::now() + delay;
        let timer = self.inner.timers.fetch_add(1, Ordering::Relaxed);

        match self.inner.delayed.entry(key.clone()) {
            Entry::Occupied(mut pending) => {
                if pending.get().0 <= deadline {
                    trace!(?key, "Earlier re-add already pending");
                    return;
                }
                pending.insert((deadline, timer));
            }
            Entry::Vacant(slot) => {
                slot.insert((deadline, timer));
            }
        }

        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let owned = queue
                .inner
                .delayed
                .remove_if(&key, |_, (_, owner)| *owner == timer)
                .is_some();
            if owned {
                queue.add(key).await;
            }
        });
    }

    /// Whether a delayed re-add is pending for `key`
    pub fn is_scheduled(&self, key: &K) -> bool {
        self.inner.delayed.contains_key(key)
    }

    /// Enqueue a failed key after its backoff; returns the delay applied
    pub fn add_rate_limited(&self, key: K) -> Duration {
        let failures = {
            let mut entry = self.inner.failures.entry(key.clone()).or_insert(0);
            let next = entry.saturating_add(1);
            *entry = next;
            next
        };
        let delay = self.inner.backoff.delay(failures);
        self.add_after(key, delay);
        delay
    }

    /// Reset the backoff of a key after a successful pass
    pub fn forget(&self, key: &K) {
        self.inner.failures.remove(key);
    }

    pub fn failures(&self, key: &K) -> u32 {
        self.inner.failures.get(key).map(|f| *f).unwrap_or(0)
    }

    /// Wait for the next key; `None` once shut down and drained
    pub async fn get(&self) -> Option<K> {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.inner.state.lock().await;
                if let Some(key) = state.queue.pop_front() {
                    state.queued.remove(&key);
                    state.processing.insert(key.clone());
                    return Some(key);
                }
                if state.shutting_down {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Mark a key finished, re-queueing it if it was added meanwhile
    pub async fn done(&self, key: &K) {
        let mut state = self.inner.state.lock().await;
        state.processing.remove(key);
        if state.dirty.remove(key) && !state.shutting_down && state.queued.insert(key.clone()) {
            state.queue.push_back(key.clone());
            drop(state);
            self.inner.notify.notify_one();
        }
    }

    /// Stop accepting keys and wake every waiting worker
    pub async fn shutdown(&self) {
        let mut state = self.inner.state.lock().await;
        state.shutting_down = true;
        state.queue.clear();
        state.queued.clear();
        state.dirty.clear();
        drop(state);
        self.inner.delayed.clear();
        self.inner.notify.notify_waiters();
    }

    pub async fn len(&self) -> usize {
        self.inner.state.lock().await.queue.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
