//! Status writes under optimistic concurrency.

use mserve_api::{set_condition, Condition, Worker, WorkerStatus, WorkloadPhase};
use mserve_id::ObjectKey;
use serde_json::Value;
use tracing::{debug, warn};

use crate::store::{Api, StoreResult};

/// Locally computed status changes.
#[derive(Debug, Clone, Default)]
pub struct StatusDelta {
    /// Merged by type into the stored conditions.
    pub conditions: Vec<Condition>,

    /// Replaces the stored phase when set.
    pub phase: Option<WorkloadPhase>,

    /// Replaces the stored observed generation when set.
    pub observed_generation: Option<i64>,
}

impl StatusDelta {
    pub fn apply(self, status: &mut WorkerStatus) {
        for condition in self.conditions {
            set_condition(&mut status.conditions, condition);
        }
        if let Some(phase) = self.phase {
            status.phase = Some(phase);
        }
        if let Some(generation) = self.observed_generation {
            status.observed_generation = Some(generation);
        }
    }
}

/// Merges status deltas into the latest stored worker.
#[derive(Clone)]
pub struct StatusWriter {
    workers: Api<Worker>,
}

impl StatusWriter {
    pub fn new(workers: Api<Worker>) -> Self {
        Self { workers }
    }

    /// Applies `delta` to the latest revision of `key`.
    ///
    /// The write is conditional on the revision that was read; a concurrent
    /// status change surfaces as a conflict. Only the status is decoded, so
    /// workers whose spec does not parse still get their conditions.
    pub async fn patch(&self, key: &ObjectKey, delta: StatusDelta) -> StoreResult<WorkerStatus> {
        let latest = self.workers.get_dynamic(key).await?;
        let mut status = stored_status(key, latest.status);
        delta.apply(&mut status);

        self.workers
            .patch_status(key, &status, latest.metadata.resource_version.as_ref())
            .await?;
        debug!(worker = %key, ready = status.is_ready(), "status written");
        Ok(status)
    }
}

/// Decodes a stored status. An unreadable one is rebuilt from scratch.
fn stored_status(key: &ObjectKey, value: Value) -> WorkerStatus {
    if value.is_null() {
        return WorkerStatus::default();
    }
    serde_json::from_value(value).unwrap_or_else(|e| {
        warn!(worker = %key, error = %e, "discarding unreadable status");
        WorkerStatus::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mserve_api::{ConditionStatus, REASON_ERROR, TYPE_READY};

    #[test]
    fn test_apply_merges_conditions_by_type() {
        let other = Condition::new("ModelCached", ConditionStatus::True, "Cached", "");
        let mut status = WorkerStatus {
            conditions: vec![other.clone(), Condition::ready("worker is running")],
            phase: Some(WorkloadPhase::Running),
            observed_generation: Some(1),
        };

        StatusDelta {
            conditions: vec![Condition::error("pull failed")],
            phase: None,
            observed_generation: Some(2),
        }
        .apply(&mut status);

        assert_eq!(status.conditions.len(), 2);
        assert_eq!(status.conditions[0], other);
        assert_eq!(status.conditions[1].type_, TYPE_READY);
        assert_eq!(status.conditions[1].reason, REASON_ERROR);
        assert_eq!(status.phase, Some(WorkloadPhase::Running));
        assert_eq!(status.observed_generation, Some(2));
    }

    #[test]
    fn test_stored_status_tolerates_garbage() {
        let key = ObjectKey::new("default", "qwen").unwrap();
        assert_eq!(stored_status(&key, Value::Null), WorkerStatus::default());
        assert_eq!(
            stored_status(&key, serde_json::json!({"phase": 42})),
            WorkerStatus::default()
        );

        let status = stored_status(&key, serde_json::json!({"phase": "Running"}));
        assert_eq!(status.phase, Some(WorkloadPhase::Running));
    }
}
