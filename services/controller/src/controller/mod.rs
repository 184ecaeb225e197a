//! Reconciliation handlers and the runner that drives them.
//!
//! A handler converges one primary kind. The runner feeds it keys from the
//! store's watch channel through a [`WorkQueue`](mserve_reconcile::WorkQueue)
//! and turns its results into queue completions.

mod dependents;
mod runner;
mod status;
mod worker;

pub use dependents::{facade_spec, DependentSync};
pub use runner::{Controller, ControllerConfig};
pub use status::{StatusDelta, StatusWriter};
pub use worker::{condition_for, normalize_labels, WorkerReconciler};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mserve_api::{ApiError, DynamicObject, Kind, WatchEvent};
use mserve_id::{IdError, ObjectKey, ReconcileId};
use mserve_reconcile::Action;
use tokio::sync::watch;

use crate::catalog::CatalogError;
use crate::driver::DriverError;
use crate::store::{StoreError, StoreResult};

/// Result type for reconcile invocations.
pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// How the runner treats a failed invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The object disappeared; nothing left to do.
    NotFound,
    /// Lost an optimistic-concurrency race; retry against fresh state.
    Conflict,
    /// A dependency is flaky or slow; retry with backoff.
    Transient,
    /// The object as written cannot converge; surfaced on the object, retried.
    Validation,
    /// Shutdown interrupted the invocation.
    Cancelled,
}

/// Errors that end a reconcile invocation.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("{0}")]
    Validation(String),

    /// One or more dependent objects could not be ensured.
    #[error("dependent sync failed: {}", join_errors(.0))]
    Dependents(Vec<ReconcileError>),

    #[error("reconcile timed out after {0:?}")]
    Timeout(Duration),

    #[error("reconcile cancelled by shutdown")]
    Cancelled,
}

fn join_errors(errors: &[ReconcileError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<IdError> for ReconcileError {
    fn from(err: IdError) -> Self {
        ReconcileError::Api(ApiError::InvalidKey(err))
    }
}

impl ReconcileError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ReconcileError::Store(e) => store_class(e),
            ReconcileError::Catalog(CatalogError::Store(e)) => store_class(e),
            ReconcileError::Catalog(_) => ErrorClass::Validation,
            ReconcileError::Driver(DriverError::Unavailable(_)) => ErrorClass::Transient,
            ReconcileError::Driver(DriverError::InvalidSpec(_)) => ErrorClass::Validation,
            ReconcileError::Api(_) | ReconcileError::Validation(_) => ErrorClass::Validation,
            ReconcileError::Dependents(errors) => errors
                .iter()
                .map(ReconcileError::class)
                .find(|class| *class != ErrorClass::Validation)
                .unwrap_or(ErrorClass::Validation),
            ReconcileError::Timeout(_) => ErrorClass::Transient,
            ReconcileError::Cancelled => ErrorClass::Cancelled,
        }
    }
}

fn store_class(err: &StoreError) -> ErrorClass {
    match err {
        StoreError::NotFound { .. } => ErrorClass::NotFound,
        StoreError::Conflict { .. } | StoreError::AlreadyExists { .. } => ErrorClass::Conflict,
        StoreError::Unavailable(_) => ErrorClass::Transient,
        StoreError::Invalid(_) => ErrorClass::Validation,
    }
}

/// Per-invocation context handed to handlers.
#[derive(Debug, Clone)]
pub struct ReconcileContext {
    pub reconcile_id: ReconcileId,
    shutdown: watch::Receiver<bool>,
}

impl ReconcileContext {
    pub fn new(shutdown: watch::Receiver<bool>) -> Self {
        Self {
            reconcile_id: ReconcileId::new(),
            shutdown,
        }
    }

    /// A context that is never cancelled.
    pub fn detached() -> Self {
        let (_, shutdown) = watch::channel(false);
        Self::new(shutdown)
    }

    pub fn is_cancelled(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Fails with `Cancelled` once shutdown has been requested.
    pub fn checkpoint(&self) -> ReconcileResult<()> {
        if self.is_cancelled() {
            return Err(ReconcileError::Cancelled);
        }
        Ok(())
    }
}

/// A reconciliation handler for one primary kind.
#[async_trait]
pub trait Reconciler: Send + Sync {
    /// The primary kind this handler converges.
    fn kind(&self) -> Kind;

    /// Secondary kinds whose events may map back to primary keys.
    fn watches(&self) -> &'static [Kind] {
        &[]
    }

    /// Primary keys to enqueue for a watch event. Empty means ignore.
    fn keys_for(&self, event: &WatchEvent<DynamicObject>) -> Vec<ObjectKey>;

    /// Converges one object.
    async fn reconcile(&self, key: &ObjectKey, ctx: &ReconcileContext) -> ReconcileResult<Action>;
}

/// Errors from building the handler registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("a handler for {0} is already registered")]
    Duplicate(Kind),
}

/// Registry of reconciliation handlers, one per primary kind.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: BTreeMap<Kind, Arc<dyn Reconciler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a handler. Each kind can be registered once.
    pub fn register(&mut self, handler: Arc<dyn Reconciler>) -> Result<(), RegistryError> {
        let kind = handler.kind();
        if self.handlers.contains_key(&kind) {
            return Err(RegistryError::Duplicate(kind));
        }
        self.handlers.insert(kind, handler);
        Ok(())
    }

    /// Get the handler for a primary kind.
    pub fn handler_for(&self, kind: Kind) -> Option<&Arc<dyn Reconciler>> {
        self.handlers.get(&kind)
    }

    /// Get all handlers.
    pub fn handlers(&self) -> impl Iterator<Item = &Arc<dyn Reconciler>> {
        self.handlers.values()
    }

    pub fn kinds(&self) -> Vec<Kind> {
        self.handlers.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Lists every object of `kind` and returns their keys.
pub(crate) async fn list_keys(
    store: &dyn crate::store::ObjectStore,
    kind: Kind,
) -> StoreResult<Vec<ObjectKey>> {
    store
        .list(kind, None)
        .await?
        .iter()
        .map(|obj| obj.key().map_err(StoreError::from))
        .collect()
}
