//! Reconciliation of `Worker` objects.
//!
//! One invocation walks these steps and stops at the first one that writes
//! metadata, so every write is followed by a fresh fetch:
//!
//! ```text
//! fetch ─▶ deletion path ─▶ attach finalizer ─▶ decode ─▶ normalize labels
//!       ─▶ delegate to driver ─▶ derive Ready ─▶ ensure facades ─▶ write status
//! ```
//!
//! Finalizer bookkeeping runs on the undecoded object, so a worker whose spec
//! does not parse can still be deleted and is reported with an Error
//! condition. The driver has no change feed; a workload that has not settled
//! is observed again after the poll interval.

use std::sync::Arc;

use async_trait::async_trait;
use std::time::Duration;

use mserve_api::{
    ApiError, Condition, DynamicObject, Kind, ModelCapabilities, Resource, WatchEvent, Worker,
    WorkloadPhase, LABEL_WORKER_TYPE, WORKER_FINALIZER,
};
use mserve_id::ObjectKey;
use mserve_reconcile::{Action, DEFAULT_POLL_INTERVAL};
use tracing::{debug, info, instrument, warn};

use super::{
    DependentSync, ReconcileContext, ReconcileError, ReconcileResult, Reconciler, StatusDelta,
    StatusWriter,
};
use crate::catalog::ModelCatalog;
use crate::driver::{WorkloadDriver, WorkloadObservation};
use crate::store::{Api, ObjectStore};

/// Message on the Ready condition while the workload serves.
const RUNNING_MESSAGE: &str = "worker is running";

/// Reconciler for the `Worker` kind.
pub struct WorkerReconciler {
    workers: Api<Worker>,
    driver: Arc<dyn WorkloadDriver>,
    catalog: Arc<dyn ModelCatalog>,
    dependents: DependentSync,
    status: StatusWriter,
    poll_interval: Duration,
}

impl WorkerReconciler {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        driver: Arc<dyn WorkloadDriver>,
        catalog: Arc<dyn ModelCatalog>,
    ) -> Self {
        Self {
            workers: Api::new(Arc::clone(&store)),
            driver,
            catalog,
            dependents: DependentSync::new(Arc::clone(&store)),
            status: StatusWriter::new(Api::new(store)),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Sets how long to wait before re-observing an unsettled workload.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Runs one reconcile invocation for `key`.
    #[instrument(skip(self, ctx), fields(worker = %key, reconcile_id = %ctx.reconcile_id))]
    pub async fn reconcile_worker(
        &self,
        key: &ObjectKey,
        ctx: &ReconcileContext,
    ) -> ReconcileResult<Action> {
        let mut obj = match self.workers.get_dynamic(key).await {
            Ok(obj) => obj,
            Err(e) if e.is_not_found() => {
                debug!("worker no longer exists");
                return Ok(Action::AwaitChange);
            }
            Err(e) => return Err(e.into()),
        };
        ctx.checkpoint()?;

        if obj.metadata.is_deleting() {
            return self.finalize(obj).await;
        }

        if obj.metadata.add_finalizer(WORKER_FINALIZER) {
            self.workers.update_dynamic(&obj).await?;
            info!("finalizer attached");
            return Ok(Action::Requeue);
        }
        ctx.checkpoint()?;

        let generation = obj.metadata.generation;
        let mut worker = match Worker::from_dynamic(obj) {
            Ok(worker) => worker,
            Err(e) => return self.reject(key, generation, e).await,
        };

        if normalize_labels(&mut worker) {
            self.workers.update(&worker).await?;
            info!(worker_type = %worker.effective_type(), "labels normalized");
            return Ok(Action::Requeue);
        }
        ctx.checkpoint()?;

        let (condition, phase, failure) = match self.delegate(&worker).await {
            Ok((capabilities, observation)) => {
                let condition = condition_for(&observation);
                if condition.is_true() {
                    ctx.checkpoint()?;
                    match self.dependents.sync(&worker, capabilities).await {
                        Ok(()) => (condition, Some(observation.phase), None),
                        Err(e) => (
                            Condition::error(e.to_string()),
                            Some(observation.phase),
                            Some(e),
                        ),
                    }
                } else {
                    (condition, Some(observation.phase), None)
                }
            }
            Err(e) => (Condition::error(e.to_string()), None, Some(e)),
        };

        if let Some(e) = failure.as_ref() {
            warn!(error = %e, "worker not converged");
        }

        let delta = StatusDelta {
            conditions: vec![condition],
            phase,
            observed_generation: Some(worker.metadata.generation),
        };
        self.status.patch(key, delta).await?;

        match failure {
            Some(e) => Err(e),
            None if settled(phase) => Ok(Action::AwaitChange),
            None => Ok(Action::RequeueAfter(self.poll_interval)),
        }
    }

    /// Releases the finalizer of a worker marked for deletion.
    async fn finalize(&self, mut obj: DynamicObject) -> ReconcileResult<Action> {
        if !obj.metadata.remove_finalizer(WORKER_FINALIZER) {
            debug!("deletion pending on other finalizers");
            return Ok(Action::AwaitChange);
        }

        // The workload itself is left to owner-reference garbage collection.
        self.workers.update_dynamic(&obj).await?;
        info!("finalizer removed");
        Ok(Action::AwaitChange)
    }

    /// Reports a worker whose spec does not decode.
    async fn reject(
        &self,
        key: &ObjectKey,
        generation: i64,
        err: ApiError,
    ) -> ReconcileResult<Action> {
        warn!(error = %err, "worker spec rejected");
        let delta = StatusDelta {
            conditions: vec![Condition::error(format!("invalid worker spec: {err}"))],
            phase: None,
            observed_generation: Some(generation),
        };
        self.status.patch(key, delta).await?;
        Err(err.into())
    }

    /// Resolves the model, then starts and observes the workload.
    async fn delegate(
        &self,
        worker: &Worker,
    ) -> ReconcileResult<(ModelCapabilities, WorkloadObservation)> {
        let capabilities = self
            .catalog
            .capabilities(&worker.metadata.namespace, &worker.spec.model)
            .await?;
        self.driver.ensure_started(worker).await?;
        let observation = self.driver.observe(worker).await?;
        debug!(phase = %observation.phase, "workload observed");
        Ok((capabilities, observation))
    }
}

/// Brings derived labels in line with the spec. Returns true if any changed.
pub fn normalize_labels(worker: &mut Worker) -> bool {
    let desired = worker.effective_type().as_str();
    let labels = &mut worker.metadata.labels;
    if labels.get(LABEL_WORKER_TYPE).map(String::as_str) == Some(desired) {
        return false;
    }
    labels.insert(LABEL_WORKER_TYPE.to_string(), desired.to_string());
    true
}

/// Maps a workload observation onto the Ready condition.
pub fn condition_for(observation: &WorkloadObservation) -> Condition {
    match observation.phase {
        WorkloadPhase::Running | WorkloadPhase::Succeeded => Condition::ready(RUNNING_MESSAGE),
        WorkloadPhase::Pending | WorkloadPhase::Unknown => {
            Condition::pending(observation.message.clone())
        }
        WorkloadPhase::Failed => Condition::error(observation.message.clone()),
    }
}

/// Whether an observed phase will not change without a spec change.
fn settled(phase: Option<WorkloadPhase>) -> bool {
    !matches!(
        phase,
        Some(WorkloadPhase::Pending) | Some(WorkloadPhase::Unknown)
    )
}

/// Whether a change to a worker warrants a reconcile.
fn worker_changed(old: &DynamicObject, new: &DynamicObject) -> bool {
    old.spec != new.spec
        || old.metadata.generation != new.metadata.generation
        || new.metadata.is_deleting()
}

/// Key of the worker that controls a facade object.
fn owning_worker(obj: &DynamicObject) -> Option<ObjectKey> {
    let owner = obj.metadata.controller_owner()?;
    if owner.kind != Kind::Worker {
        return None;
    }
    ObjectKey::new(obj.metadata.namespace.as_str(), owner.name.as_str()).ok()
}

#[async_trait]
impl Reconciler for WorkerReconciler {
    fn kind(&self) -> Kind {
        Worker::KIND
    }

    fn watches(&self) -> &'static [Kind] {
        &[Kind::Embedder, Kind::Llm]
    }

    fn keys_for(&self, event: &WatchEvent<DynamicObject>) -> Vec<ObjectKey> {
        match event.kind() {
            Kind::Worker => {
                let relevant = match event {
                    WatchEvent::Added(_) | WatchEvent::Deleted(_) => true,
                    WatchEvent::Modified { old, new } => worker_changed(old, new),
                };
                if !relevant {
                    return vec![];
                }
                event.object().key().ok().into_iter().collect()
            }
            Kind::Embedder | Kind::Llm => owning_worker(event.object()).into_iter().collect(),
            Kind::Model => vec![],
        }
    }

    async fn reconcile(&self, key: &ObjectKey, ctx: &ReconcileContext) -> ReconcileResult<Action> {
        self.reconcile_worker(key, ctx).await
    }
}
