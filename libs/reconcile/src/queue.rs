//! Per-key deduplicating work queue.
//!
//! A key moves between three places:
//!
//! ```text
//! add ──▶ dirty ──get──▶ processing ──done──▶ (gone | dirty again)
//! ```
//!
//! A key is in the ready channel at most once, and never while it is being
//! processed. Re-adding a key that is being processed only marks it dirty;
//! `done` hands it back to the ready channel.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::trace;

use crate::{Action, BackoffPolicy, Completion};

struct QueueState<K> {
    /// Keys waiting for a run, including keys re-added while processing.
    dirty: HashSet<K>,

    /// Keys currently handed out to a worker.
    processing: HashSet<K>,

    /// Consecutive failures per key.
    failures: HashMap<K, u32>,

    /// Keys sitting in the ready channel.
    ready: usize,

    shutting_down: bool,
}

/// Work queue keyed by object identity.
pub struct WorkQueue<K> {
    state: Mutex<QueueState<K>>,
    ready_tx: mpsc::UnboundedSender<K>,
    ready_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<K>>,
    shutdown: watch::Sender<bool>,
    backoff: BackoffPolicy,
}

impl<K> WorkQueue<K>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
{
    pub fn new(backoff: BackoffPolicy) -> Self {
        let (ready_tx, ready_rx) = mpsc::unbounded_channel();
        let (shutdown, _) = watch::channel(false);
        Self {
            state: Mutex::new(QueueState {
                dirty: HashSet::new(),
                processing: HashSet::new(),
                failures: HashMap::new(),
                ready: 0,
                shutting_down: false,
            }),
            ready_tx,
            ready_rx: tokio::sync::Mutex::new(ready_rx),
            shutdown,
            backoff,
        }
    }

    fn state(&self) -> MutexGuard<'_, QueueState<K>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueues a key. Duplicates of a pending or in-flight key coalesce.
    pub fn add(&self, key: K) {
        let mut state = self.state();
        if state.shutting_down {
            return;
        }
        if !state.dirty.insert(key.clone()) {
            trace!(?key, "key already pending");
            return;
        }
        if state.processing.contains(&key) {
            trace!(?key, "key in flight, deferring");
            return;
        }
        self.push_ready(&mut state, key);
    }

    /// Enqueues a key once `delay` has elapsed.
    pub fn add_after(self: &Arc<Self>, key: K, delay: Duration) {
        if delay.is_zero() {
            self.add(key);
            return;
        }
        let queue = Arc::clone(self);
        let shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => queue.add(key),
                _ = stopped(shutdown) => {}
            }
        });
    }

    /// Waits for the next ready key and marks it in flight.
    ///
    /// Returns `None` once the queue is shut down.
    pub async fn get(&self) -> Option<K> {
        let shutdown = self.shutdown.subscribe();
        if *shutdown.borrow() {
            return None;
        }

        let mut rx = self.ready_rx.lock().await;
        let key = tokio::select! {
            biased;
            _ = stopped(shutdown) => return None,
            key = rx.recv() => key?,
        };
        drop(rx);

        let mut state = self.state();
        state.ready = state.ready.saturating_sub(1);
        state.dirty.remove(&key);
        state.processing.insert(key.clone());
        Some(key)
    }

    /// Marks a key as finished and schedules its follow-up.
    pub fn done(self: &Arc<Self>, key: K, completion: Completion) {
        let follow_up = {
            let mut state = self.state();
            state.processing.remove(&key);

            let follow_up = match completion {
                Completion::Success(action) => {
                    state.failures.remove(&key);
                    match action {
                        Action::AwaitChange => None,
                        Action::Requeue => Some(Duration::ZERO),
                        Action::RequeueAfter(delay) => Some(delay),
                    }
                }
                Completion::Failed => {
                    let attempts = state.failures.entry(key.clone()).or_insert(0);
                    let delay = self.backoff.delay(*attempts);
                    *attempts = attempts.saturating_add(1);
                    trace!(?key, attempts = *attempts, ?delay, "scheduling retry");
                    Some(delay)
                }
            };

            if state.dirty.contains(&key) && !state.shutting_down {
                self.push_ready(&mut state, key.clone());
            }
            follow_up
        };

        if let Some(delay) = follow_up {
            self.add_after(key, delay);
        }
    }

    /// Stops intake and wakes every blocked `get`.
    pub fn shut_down(&self) {
        self.state().shutting_down = true;
        self.shutdown.send_replace(true);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.state().shutting_down
    }

    /// Number of keys ready to be handed out.
    pub fn len(&self) -> usize {
        self.state().ready
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of keys currently being processed.
    pub fn in_flight(&self) -> usize {
        self.state().processing.len()
    }

    /// Consecutive failures recorded for a key.
    pub fn failures(&self, key: &K) -> u32 {
        self.state().failures.get(key).copied().unwrap_or(0)
    }

    fn push_ready(&self, state: &mut QueueState<K>, key: K) {
        if self.ready_tx.send(key).is_ok() {
            state.ready += 1;
        }
    }
}

/// Resolves once the shutdown flag reads true.
async fn stopped(mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
