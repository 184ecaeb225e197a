//! Reconciliation loop primitives.
//!
//! This library provides the pieces shared by every reconciliation loop:
//!
//! - **Work queue**: per-key deduplication, at most one in-flight invocation
//!   per key, coalescing of re-enqueues, exponential backoff on failure.
//! - **Actions**: what a finished invocation asks the queue to do next.
//! - **Spec hashes**: deterministic fingerprints used for drift detection.
//!
//! # Invariants
//!
//! - A key is never handed to two workers at once
//! - Any number of enqueues while a key is in flight collapse into one re-run
//! - Backoff for a key resets on its next successful invocation

mod backoff;
mod queue;
mod spec_hash;

use std::time::Duration;

pub use backoff::BackoffPolicy;
pub use queue::WorkQueue;
pub use spec_hash::SpecHash;

/// Follow-up requested by a successful invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Nothing further until the object changes.
    AwaitChange,

    /// Run again as soon as a worker is free.
    Requeue,

    /// Run again after the given delay.
    RequeueAfter(Duration),
}

/// Outcome reported to the queue when an invocation finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Success(Action),
    Failed,
}

/// Default number of parallel workers per controller.
pub const DEFAULT_WORKERS: usize = 4;

/// Default interval between full resyncs.
pub const DEFAULT_RESYNC_INTERVAL: Duration = Duration::from_secs(300);

/// Default deadline for one invocation.
pub const DEFAULT_RECONCILE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default delay before re-observing a workload that has not settled.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
