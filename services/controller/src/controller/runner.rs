//! Controller runner.
//!
//! Per registered handler the runner starts:
//! - an intake task: initial list, then watch events plus a periodic resync
//! - a pool of worker tasks pulling keys from one shared work queue
//!
//! Shutdown stops intake, which shuts the queue down; workers finish the
//! invocation they are running and exit.

use std::sync::Arc;
use std::time::Duration;

use mserve_api::Kind;
use mserve_id::ObjectKey;
use mserve_reconcile::{
    Action, BackoffPolicy, Completion, WorkQueue, DEFAULT_RECONCILE_TIMEOUT,
    DEFAULT_RESYNC_INTERVAL, DEFAULT_WORKERS,
};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::{list_keys, ErrorClass, HandlerRegistry, ReconcileContext, ReconcileError, Reconciler};
use crate::store::ObjectStore;

/// Runner configuration.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Worker tasks per handler.
    pub workers: usize,

    /// Deadline for one reconcile invocation.
    pub reconcile_timeout: Duration,

    /// Interval between full relists of the primary kind.
    pub resync_interval: Duration,

    /// Retry backoff for failed invocations.
    pub backoff: BackoffPolicy,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            reconcile_timeout: DEFAULT_RECONCILE_TIMEOUT,
            resync_interval: DEFAULT_RESYNC_INTERVAL,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Drives every registered handler until shutdown.
pub struct Controller {
    store: Arc<dyn ObjectStore>,
    registry: HandlerRegistry,
    config: ControllerConfig,
}

impl Controller {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        registry: HandlerRegistry,
        config: ControllerConfig,
    ) -> Self {
        Self {
            store,
            registry,
            config,
        }
    }

    /// Run all handlers until `shutdown` flips to true.
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        info!(
            kinds = ?self.registry.kinds(),
            workers = self.config.workers,
            reconcile_timeout_secs = self.config.reconcile_timeout.as_secs(),
            resync_interval_secs = self.config.resync_interval.as_secs(),
            "Starting controller"
        );

        let mut tasks = JoinSet::new();
        for handler in self.registry.handlers() {
            let queue = Arc::new(WorkQueue::new(self.config.backoff.clone()));

            tasks.spawn(run_intake(
                Arc::clone(&self.store),
                Arc::clone(handler),
                Arc::clone(&queue),
                self.config.resync_interval,
                shutdown.clone(),
            ));

            for worker_id in 0..self.config.workers.max(1) {
                tasks.spawn(run_worker(
                    worker_id,
                    Arc::clone(handler),
                    Arc::clone(&queue),
                    self.config.reconcile_timeout,
                    shutdown.clone(),
                ));
            }
        }

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "Controller task panicked");
            }
        }
        info!("Controller stopped");
    }
}

/// Enqueues every existing object of the handler's kind.
async fn enqueue_all(
    store: &dyn ObjectStore,
    kind: Kind,
    queue: &WorkQueue<ObjectKey>,
) {
    match list_keys(store, kind).await {
        Ok(keys) => {
            debug!(%kind, count = keys.len(), "Resync");
            for key in keys {
                queue.add(key);
            }
        }
        Err(e) => warn!(%kind, error = %e, "Failed to list objects for resync"),
    }
}

async fn run_intake(
    store: Arc<dyn ObjectStore>,
    handler: Arc<dyn Reconciler>,
    queue: Arc<WorkQueue<ObjectKey>>,
    resync_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let kind = handler.kind();
    // Subscribe before listing so no change falls between the two.
    let mut events = store.watch();
    let mut resync = tokio::time::interval_at(Instant::now() + resync_interval, resync_interval);
    resync.set_missed_tick_behavior(MissedTickBehavior::Delay);

    enqueue_all(store.as_ref(), kind, &queue).await;

    while !*shutdown.borrow() {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = resync.tick() => enqueue_all(store.as_ref(), kind, &queue).await,
            event = events.recv() => match event {
                Ok(event) => {
                    let event_kind = event.kind();
                    if event_kind != kind && !handler.watches().contains(&event_kind) {
                        continue;
                    }
                    for key in handler.keys_for(&event) {
                        queue.add(key);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(%kind, skipped, "Watch lagged, relisting");
                    enqueue_all(store.as_ref(), kind, &queue).await;
                }
                Err(RecvError::Closed) => {
                    warn!(%kind, "Watch channel closed");
                    break;
                }
            },
        }
    }

    queue.shut_down();
    info!(%kind, "Intake stopped");
}

async fn run_worker(
    worker_id: usize,
    handler: Arc<dyn Reconciler>,
    queue: Arc<WorkQueue<ObjectKey>>,
    reconcile_timeout: Duration,
    shutdown: watch::Receiver<bool>,
) {
    let kind = handler.kind();
    while let Some(key) = queue.get().await {
        let ctx = ReconcileContext::new(shutdown.clone());
        let started = Instant::now();

        let result = match tokio::time::timeout(reconcile_timeout, handler.reconcile(&key, &ctx)).await
        {
            Ok(result) => result,
            Err(_) => Err(ReconcileError::Timeout(reconcile_timeout)),
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let completion = match result {
            Ok(action) => {
                debug!(%kind, %key, ?action, elapsed_ms, "Reconciled");
                Completion::Success(action)
            }
            Err(e) => match e.class() {
                ErrorClass::NotFound => {
                    debug!(%kind, %key, "Object gone during reconcile");
                    Completion::Success(Action::AwaitChange)
                }
                ErrorClass::Cancelled => {
                    debug!(%kind, %key, "Reconcile cancelled");
                    Completion::Success(Action::AwaitChange)
                }
                ErrorClass::Conflict => {
                    info!(%kind, %key, error = %e, "Conflict, retrying against fresh state");
                    Completion::Failed
                }
                ErrorClass::Transient | ErrorClass::Validation => {
                    warn!(
                        %kind,
                        %key,
                        error = %e,
                        attempt = queue.failures(&key) + 1,
                        elapsed_ms,
                        "Reconcile failed"
                    );
                    Completion::Failed
                }
            },
        };
        queue.done(key, completion);
    }
    debug!(%kind, worker_id, "Worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controller_config_default() {
        let config = ControllerConfig::default();
        assert_eq!(config.workers, 4);
        assert_eq!(config.reconcile_timeout, Duration::from_secs(30));
        assert_eq!(config.resync_interval, Duration::from_secs(300));
        assert_eq!(config.backoff.base, Duration::from_millis(100));
    }
}
