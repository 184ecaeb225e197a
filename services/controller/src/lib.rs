//! mserve Controller Library
//!
//! The controller converges `Worker` objects: it keeps a finalizer on live
//! workers, normalizes their labels, starts the serving workload through a
//! driver, reports a Ready condition, and creates `Embedder`/`Llm` facades
//! for workers whose model supports them.
//!
//! ## Architecture
//!
//! ```text
//! store watch ─▶ intake ─▶ WorkQueue ─▶ workers ─▶ WorkerReconciler
//!                                                   ├── WorkloadDriver
//!                                                   ├── DependentSync
//!                                                   └── StatusWriter
//! ```
//!
//! ## Modules
//!
//! - `store`: object store interface, typed `Api` and the in-memory store
//! - `driver`: workload driver interface and the simulated driver
//! - `catalog`: model capability lookup
//! - `controller`: reconciliation handlers and the runner

pub mod catalog;
pub mod config;
pub mod controller;
pub mod driver;
pub mod store;

// Re-export commonly used types
pub use catalog::{ModelCatalog, StoreModelCatalog};
pub use controller::{
    Controller, ControllerConfig, HandlerRegistry, ReconcileContext, ReconcileError, Reconciler,
    WorkerReconciler,
};
pub use driver::{SimulatedDriver, WorkloadDriver, WorkloadObservation};
pub use store::{Api, MemoryStore, ObjectStore};
