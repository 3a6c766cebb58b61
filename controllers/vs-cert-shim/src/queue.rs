//! Rate-limited work queue
//!
//! A deduplicating FIFO shared by the watch handlers (producers) and the
//! worker pool (consumers):
//!
//! - a key that is already pending is not queued twice
//! - a key that is being processed is never handed to a second worker; adds
//!   that arrive meanwhile are held back until [`WorkQueue::done`]
//! - failed keys come back after a per-key exponential delay
//!
//! After [`WorkQueue::shut_down`], [`WorkQueue::get`] returns `None` and adds
//! are dropped.
//!
//! A queue built with [`WorkQueue::with_depth_gauge`] keeps the gauge equal to
//! the number of keys ready to be handed out.

use crate::backoff::ExponentialBackoff;
use prometheus::IntGauge;
use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::trace;

#[derive(Debug)]
struct State<K> {
    queue: VecDeque<K>,
    /// Keys waiting to be processed (queued or held back)
    dirty: HashSet<K>,
    /// Keys handed to a worker and not yet marked done
    processing: HashSet<K>,
    /// Consecutive failures per key
    failures: HashMap<K, u32>,
}

#[derive(Debug)]
struct Inner<K> {
    state: Mutex<State<K>>,
    available: Notify,
    shutdown: CancellationToken,
    backoff: ExponentialBackoff,
    depth: Option<IntGauge>,
}

/// Deduplicating, rate-limited work queue
#[derive(Debug)]
pub struct WorkQueue<K> {
    inner: Arc<Inner<K>>,
}

impl<K> Clone for WorkQueue<K> {
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
    /// Create an empty queue retrying failed keys with `backoff`
    pub fn new(backoff: ExponentialBackoff) -> Self {
        Self::build(backoff, None)
    }

    /// Like [`WorkQueue::new`], reporting the number of ready keys in `depth`
    pub fn with_depth_gauge(backoff: ExponentialBackoff, depth: IntGauge) -> Self {
        Self::build(backoff, Some(depth))
    }

    fn build(backoff: ExponentialBackoff, depth: Option<IntGauge>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    queue: VecDeque::new(),
                    dirty: HashSet::new(),
                    processing: HashSet::new(),
                    failures: HashMap::new(),
                }),
                available: Notify::new(),
                shutdown: CancellationToken::new(),
                backoff,
                depth,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State<K>> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish_depth(&self, state: &State<K>) {
        if let Some(depth) = &self.inner.depth {
            depth.set(i64::try_from(state.queue.len()).unwrap_or(i64::MAX));
        }
    }

    /// Queue a key for processing
    pub fn add(&self, key: K) {
        if self.is_shutting_down() {
            return;
        }
        let mut state = self.state();
        if !state.dirty.insert(key.clone()) {
            trace!(?key, "already pending");
            return;
        }
        if state.processing.contains(&key) {
            trace!(?key, "in flight, held back until done");
            return;
        }
        state.queue.push_back(key);
        self.publish_depth(&state);
        drop(state);
        self.inner.available.notify_one();
    }

    /// Wait for the next key. Returns `None` once the queue is shut down.
    pub async fn get(&self) -> Option<K> {
        loop {
            if self.is_shutting_down() {
                return None;
            }
            {
                let mut state = self.state();
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    self.publish_depth(&state);
                    let more = !state.queue.is_empty();
                    drop(state);
                    // Notify keeps a single permit, so pass the wakeup on
                    if more {
                        self.inner.available.notify_one();
                    }
                    return Some(key);
                }
            }
            tokio::select! {
                () = self.inner.available.notified() => {}
                () = self.inner.shutdown.cancelled() => return None,
            }
        }
    }

    /// Mark a key returned by [`WorkQueue::get`] as finished
    pub fn done(&self, key: &K) {
        let mut state = self.state();
        state.processing.remove(key);
        if state.dirty.contains(key) {
            state.queue.push_back(key.clone());
            self.publish_depth(&state);
            drop(state);
            self.inner.available.notify_one();
        }
    }

    /// Queue a key after `delay`
    pub fn add_after(&self, key: K, delay: Duration) {
        if self.is_shutting_down() {
            return;
        }
        if delay.is_zero() {
            self.add(key);
            return;
        }
        let queue = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(delay) => queue.add(key),
                () = queue.inner.shutdown.cancelled() => {}
            }
        });
    }

    /// Record a failure for `key` and queue it after its backoff delay
    pub fn add_rate_limited(&self, key: K) {
        let delay = {
            let mut state = self.state();
            let failures = state.failures.entry(key.clone()).or_insert(0);
            *failures = failures.saturating_add(1);
            self.inner.backoff.delay(*failures)
        };
        trace!(?key, ?delay, "requeue with backoff");
        self.add_after(key, delay);
    }

    /// Clear the failure history of `key`
    pub fn forget(&self, key: &K) {
        self.state().failures.remove(key);
    }

    /// Consecutive failures recorded for `key`
    pub fn num_requeues(&self, key: &K) -> u32 {
        self.state().failures.get(key).copied().unwrap_or(0)
    }

    /// Keys ready to be handed out
    pub fn len(&self) -> usize {
        self.state().queue.len()
    }

    /// True when no key is ready to be handed out
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop handing out keys and wake every waiting worker
    pub fn shut_down(&self) {
        self.inner.shutdown.cancel();
    }

    /// True once [`WorkQueue::shut_down`] has been called
    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }
}
