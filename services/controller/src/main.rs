//! mserve Controller
//!
//! Reconciles `Worker` objects against an in-memory object store and a
//! simulated workload driver.
//!
//! ## Architecture
//!
//! - **Store**: in-memory, optionally seeded from `MSERVE_SEED_FILE`
//! - **Driver**: simulated, reporting the phase in `MSERVE_WORKLOAD_PHASE`
//! - **Controller**: one work queue and worker pool per registered kind

use std::sync::Arc;

use anyhow::{Context, Result};
use mserve_api::DynamicObject;
use mserve_controller::config::Config;
use mserve_controller::{
    Api, Controller, HandlerRegistry, MemoryStore, ObjectStore, SimulatedDriver,
    StoreModelCatalog, WorkerReconciler,
};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str())),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting mserve controller");
    info!(
        workers = config.workers,
        reconcile_timeout_secs = config.reconcile_timeout_secs,
        resync_interval_secs = config.resync_interval_secs,
        poll_interval_secs = config.poll_interval_secs,
        workload_phase = %config.workload_phase,
        "Configuration loaded"
    );

    let store = Arc::new(MemoryStore::new());
    if let Some(path) = &config.seed_file {
        let count = seed_store(&store, path).await?;
        info!(path = %path, count, "Seeded object store");
    }
    let store: Arc<dyn ObjectStore> = store;

    let driver = Arc::new(SimulatedDriver::with_phase(config.workload_phase));
    let catalog = Arc::new(StoreModelCatalog::new(Api::new(Arc::clone(&store))));

    let mut registry = HandlerRegistry::new();
    registry.register(Arc::new(
        WorkerReconciler::new(Arc::clone(&store), driver, catalog)
            .with_poll_interval(config.poll_interval()),
    ))?;

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let controller = Controller::new(store, registry, config.controller_config());
    let mut controller_handle = tokio::spawn(controller.run(shutdown_rx));

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = &mut controller_handle => {
            if let Err(e) = result {
                error!(error = %e, "Controller task panicked");
            }
            return Ok(());
        }
    }

    // Signal shutdown and let in-flight reconciles finish their current step
    let _ = shutdown_tx.send(true);
    info!("Waiting for workers to shut down...");
    if let Err(e) = controller_handle.await {
        error!(error = %e, "Controller task panicked");
    }

    info!("Controller shutdown complete");
    Ok(())
}

/// Loads a JSON array of objects into the store.
async fn seed_store(store: &MemoryStore, path: &str) -> Result<usize> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read seed file {path}"))?;
    let objects: Vec<DynamicObject> =
        serde_json::from_str(&raw).with_context(|| format!("invalid seed file {path}"))?;
    let count = store.seed(objects).await?;
    Ok(count)
}
