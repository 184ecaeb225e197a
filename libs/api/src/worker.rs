//! The `Worker` kind: a model-serving workload.

use serde::{Deserialize, Serialize};

use crate::{
    find_condition, Condition, Kind, ObjectMeta, Resource, TypedObjectReference, TYPE_READY,
};

/// Finalizer the controller keeps on live workers.
pub const WORKER_FINALIZER: &str = "mserve.dev/finalizer";

/// Label mirroring the worker's effective type.
pub const LABEL_WORKER_TYPE: &str = "mserve.dev/worker-type";

/// Serving runtime used for the workload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkerType {
    /// Single-process serving.
    #[default]
    #[serde(rename = "fastchat")]
    Fastchat,
    /// vLLM-backed serving.
    #[serde(rename = "fastchat-vllm")]
    FastchatVllm,
    #[serde(rename = "unknown")]
    Unknown,
}

impl WorkerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerType::Fastchat => "fastchat",
            WorkerType::FastchatVllm => "fastchat-vllm",
            WorkerType::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for WorkerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields shared by every user-facing spec.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommonSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Compute requested for the workload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequests {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerSpec {
    #[serde(flatten)]
    pub common: CommonSpec,

    /// Serving runtime; `fastchat` when absent.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub worker_type: Option<WorkerType>,

    /// The model this worker serves.
    pub model: TypedObjectReference,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    #[serde(default)]
    pub resources: ResourceRequests,
}

/// Coarse lifecycle phase reported by the workload driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkloadPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    #[default]
    Unknown,
}

impl std::fmt::Display for WorkloadPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkloadPhase::Pending => "Pending",
            WorkloadPhase::Running => "Running",
            WorkloadPhase::Succeeded => "Succeeded",
            WorkloadPhase::Failed => "Failed",
            WorkloadPhase::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for WorkloadPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "unknown" => Ok(Self::Unknown),
            other => Err(format!("unknown workload phase '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Last phase observed from the workload driver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<WorkloadPhase>,

    /// Generation the status was computed from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl WorkerStatus {
    pub fn is_ready(&self) -> bool {
        find_condition(&self.conditions, TYPE_READY).is_some_and(Condition::is_true)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worker {
    pub metadata: ObjectMeta,
    pub spec: WorkerSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<WorkerStatus>,
}

impl Worker {
    /// The type the worker runs as, defaulting when the spec leaves it out.
    pub fn effective_type(&self) -> WorkerType {
        self.spec.worker_type.unwrap_or_default()
    }

    /// Name of the facade objects derived from this worker.
    pub fn dependent_name(&self) -> String {
        format!("{}-worker", self.metadata.name)
    }

    pub fn is_ready(&self) -> bool {
        self.status.as_ref().is_some_and(WorkerStatus::is_ready)
    }
}

impl Resource for Worker {
    const KIND: Kind = Kind::Worker;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn worker(worker_type: Option<WorkerType>) -> Worker {
        Worker {
            metadata: ObjectMeta::named("default", "qwen"),
            spec: WorkerSpec {
                common: CommonSpec::default(),
                worker_type,
                model: TypedObjectReference {
                    kind: "Model".into(),
                    name: "qwen-7b".into(),
                    namespace: None,
                },
                replicas: None,
                resources: ResourceRequests::default(),
            },
            status: None,
        }
    }

    #[rstest]
    #[case(None, WorkerType::Fastchat)]
    #[case(Some(WorkerType::Fastchat), WorkerType::Fastchat)]
    #[case(Some(WorkerType::FastchatVllm), WorkerType::FastchatVllm)]
    fn test_effective_type(#[case] declared: Option<WorkerType>, #[case] expected: WorkerType) {
        assert_eq!(worker(declared).effective_type(), expected);
    }

    #[test]
    fn test_type_wire_format() {
        let json = serde_json::json!({
            "metadata": { "name": "qwen", "namespace": "default" },
            "spec": {
                "type": "fastchat-vllm",
                "model": { "kind": "Model", "name": "qwen-7b" },
                "displayName": "Qwen"
            }
        });
        let worker: Worker = serde_json::from_value(json).unwrap();
        assert_eq!(worker.effective_type(), WorkerType::FastchatVllm);
        assert_eq!(worker.spec.common.display_name.as_deref(), Some("Qwen"));
    }

    #[test]
    fn test_dependent_name() {
        assert_eq!(worker(None).dependent_name(), "qwen-worker");
    }

    #[test]
    fn test_is_ready_requires_true_ready_condition() {
        let mut w = worker(None);
        assert!(!w.is_ready());
        w.status = Some(WorkerStatus {
            conditions: vec![Condition::pending("starting")],
            ..Default::default()
        });
        assert!(!w.is_ready());
        w.status = Some(WorkerStatus {
            conditions: vec![Condition::ready("running")],
            ..Default::default()
        });
        assert!(w.is_ready());
    }

    #[test]
    fn test_phase_from_str() {
        assert_eq!("running".parse::<WorkloadPhase>().unwrap(), WorkloadPhase::Running);
        assert_eq!("Failed".parse::<WorkloadPhase>().unwrap(), WorkloadPhase::Failed);
        assert!("booting".parse::<WorkloadPhase>().is_err());
    }
}
