//! Workload driver interface and simulated implementation.
//!
//! The driver owns the compute workload behind a worker:
//! - Creating it when absent, patching it when the desired spec drifted
//! - Reporting a coarse lifecycle phase
//!
//! A simulated implementation is provided for testing and development.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use mserve_api::{Resource, Worker, WorkloadPhase};
use mserve_id::ObjectKey;
use mserve_reconcile::SpecHash;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Errors reported by a workload driver.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DriverError {
    /// The backend could not be reached; retrying may help.
    #[error("workload backend unavailable: {0}")]
    Unavailable(String),

    /// The worker cannot be turned into a workload.
    #[error("invalid workload spec: {0}")]
    InvalidSpec(String),
}

/// What the driver currently sees for a workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadObservation {
    pub phase: WorkloadPhase,

    /// Human-readable detail, e.g. the failure reason.
    pub message: String,
}

impl WorkloadObservation {
    pub fn new(phase: WorkloadPhase, message: impl Into<String>) -> Self {
        Self {
            phase,
            message: message.into(),
        }
    }
}

/// Workload driver interface.
#[async_trait]
pub trait WorkloadDriver: Send + Sync {
    /// Ensures the workload for `worker` exists and matches its spec.
    async fn ensure_started(&self, worker: &Worker) -> Result<(), DriverError>;

    /// Reports the workload's current phase.
    async fn observe(&self, worker: &Worker) -> Result<WorkloadObservation, DriverError>;
}

#[derive(Debug, Clone)]
struct SimulatedWorkload {
    spec_hash: SpecHash,
    observation: WorkloadObservation,
}

/// In-memory driver for testing and development.
pub struct SimulatedDriver {
    workloads: RwLock<HashMap<ObjectKey, SimulatedWorkload>>,

    /// Phase given to newly created workloads.
    initial: WorkloadObservation,

    /// When set, every call fails with this error.
    failure: RwLock<Option<DriverError>>,

    created: AtomicU64,
    patched: AtomicU64,
}

impl SimulatedDriver {
    /// Creates a driver whose workloads start out `Running`.
    pub fn new() -> Self {
        Self::with_phase(WorkloadPhase::Running)
    }

    /// Creates a driver whose workloads start out in `phase`.
    pub fn with_phase(phase: WorkloadPhase) -> Self {
        Self {
            workloads: RwLock::new(HashMap::new()),
            initial: WorkloadObservation::new(phase, default_message(phase)),
            failure: RwLock::new(None),
            created: AtomicU64::new(0),
            patched: AtomicU64::new(0),
        }
    }

    /// Creates a driver that fails every call.
    pub fn failing(error: DriverError) -> Self {
        let mut driver = Self::new();
        driver.failure = RwLock::new(Some(error));
        driver
    }

    /// Overrides the observation reported for an existing workload.
    pub async fn set_observation(&self, key: &ObjectKey, observation: WorkloadObservation) {
        if let Some(workload) = self.workloads.write().await.get_mut(key) {
            workload.observation = observation;
        }
    }

    pub async fn set_failure(&self, error: Option<DriverError>) {
        *self.failure.write().await = error;
    }

    pub async fn has_workload(&self, key: &ObjectKey) -> bool {
        self.workloads.read().await.contains_key(key)
    }

    /// Number of workloads created so far.
    pub fn created(&self) -> u64 {
        self.created.load(Ordering::SeqCst)
    }

    /// Number of drift corrections applied so far.
    pub fn patched(&self) -> u64 {
        self.patched.load(Ordering::SeqCst)
    }

    async fn check_failure(&self) -> Result<(), DriverError> {
        match self.failure.read().await.as_ref() {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

impl Default for SimulatedDriver {
    fn default() -> Self {
        Self::new()
    }
}

fn default_message(phase: WorkloadPhase) -> &'static str {
    match phase {
        WorkloadPhase::Running | WorkloadPhase::Succeeded => "workload is serving",
        WorkloadPhase::Pending => "workload is starting",
        WorkloadPhase::Failed => "workload exited with an error",
        WorkloadPhase::Unknown => "workload state unknown",
    }
}

fn worker_key(worker: &Worker) -> Result<ObjectKey, DriverError> {
    worker
        .key()
        .map_err(|e| DriverError::InvalidSpec(e.to_string()))
}

#[async_trait]
impl WorkloadDriver for SimulatedDriver {
    async fn ensure_started(&self, worker: &Worker) -> Result<(), DriverError> {
        self.check_failure().await?;
        let key = worker_key(worker)?;
        let spec_hash =
            SpecHash::of(&worker.spec).map_err(|e| DriverError::InvalidSpec(e.to_string()))?;

        let mut workloads = self.workloads.write().await;
        match workloads.get_mut(&key) {
            None => {
                info!(worker = %key, spec_hash = %spec_hash, "[SIM] creating workload");
                workloads.insert(
                    key,
                    SimulatedWorkload {
                        spec_hash,
                        observation: self.initial.clone(),
                    },
                );
                self.created.fetch_add(1, Ordering::SeqCst);
            }
            Some(workload) if workload.spec_hash != spec_hash => {
                info!(
                    worker = %key,
                    from = %workload.spec_hash,
                    to = %spec_hash,
                    "[SIM] patching drifted workload"
                );
                workload.spec_hash = spec_hash;
                self.patched.fetch_add(1, Ordering::SeqCst);
            }
            Some(_) => {
                debug!(worker = %key, "[SIM] workload up to date");
            }
        }
        Ok(())
    }

    async fn observe(&self, worker: &Worker) -> Result<WorkloadObservation, DriverError> {
        self.check_failure().await?;
        let key = worker_key(worker)?;
        Ok(self
            .workloads
            .read()
            .await
            .get(&key)
            .map(|w| w.observation.clone())
            .unwrap_or_else(|| WorkloadObservation::new(WorkloadPhase::Unknown, "workload not found")))
    }
}
