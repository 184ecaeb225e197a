//! Status conditions.
//!
//! A condition is a named fact about an object ("Ready") with a reason code,
//! a human message and two timestamps. A condition list holds at most one
//! entry per type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Condition type reporting overall readiness.
pub const TYPE_READY: &str = "Ready";

/// Reason used when the workload is up.
pub const REASON_RUNNING: &str = "WorkerRunning";

/// Reason used while the workload is starting or its state is unknown.
pub const REASON_PENDING: &str = "Pending";

/// Reason used for any failure surfaced to the object's owner.
pub const REASON_ERROR: &str = "Error";

/// Condition status following Kubernetes conventions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,

    pub status: ConditionStatus,

    /// Machine-readable reason code.
    #[serde(default)]
    pub reason: String,

    /// Human-readable message.
    #[serde(default)]
    pub message: String,

    /// Last time `status` changed.
    pub last_transition_time: DateTime<Utc>,

    /// Last time this condition was observed by the controller.
    pub last_successful_time: DateTime<Utc>,
}

impl Condition {
    /// Creates a condition observed now.
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: now,
            last_successful_time: now,
        }
    }

    pub fn ready(message: impl Into<String>) -> Self {
        Self::new(TYPE_READY, ConditionStatus::True, REASON_RUNNING, message)
    }

    pub fn pending(message: impl Into<String>) -> Self {
        Self::new(TYPE_READY, ConditionStatus::False, REASON_PENDING, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(TYPE_READY, ConditionStatus::False, REASON_ERROR, message)
    }

    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }
}

/// Inserts or replaces the condition with the same type.
///
/// The transition time of an existing entry is kept when the status did not
/// change. Stray duplicates of the type are dropped.
pub fn set_condition(conditions: &mut Vec<Condition>, mut condition: Condition) {
    let Some(pos) = conditions.iter().position(|c| c.type_ == condition.type_) else {
        conditions.push(condition);
        return;
    };

    let existing = &mut conditions[pos];
    if existing.status == condition.status {
        condition.last_transition_time = existing.last_transition_time;
    }
    let type_ = condition.type_.clone();
    *existing = condition;

    let mut seen = false;
    conditions.retain(|c| {
        if c.type_ != type_ {
            return true;
        }
        let keep = !seen;
        seen = true;
        keep
    });
}

pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn aged(mut c: Condition, secs: i64) -> Condition {
        c.last_transition_time -= Duration::seconds(secs);
        c.last_successful_time -= Duration::seconds(secs);
        c
    }

    #[test]
    fn test_set_condition_appends_new_type() {
        let mut conditions = vec![];
        set_condition(&mut conditions, Condition::pending("starting"));
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].reason, REASON_PENDING);
    }

    #[test]
    fn test_same_status_keeps_transition_time() {
        let original = aged(Condition::pending("starting"), 60);
        let transition = original.last_transition_time;
        let mut conditions = vec![original];

        set_condition(&mut conditions, Condition::error("pull failed"));

        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].reason, REASON_ERROR);
        assert_eq!(conditions[0].message, "pull failed");
        assert_eq!(conditions[0].last_transition_time, transition);
        assert!(conditions[0].last_successful_time > transition);
    }

    #[test]
    fn test_status_flip_bumps_transition_time() {
        let original = aged(Condition::pending("starting"), 60);
        let transition = original.last_transition_time;
        let mut conditions = vec![original];

        set_condition(&mut conditions, Condition::ready("running"));

        assert!(conditions[0].is_true());
        assert!(conditions[0].last_transition_time > transition);
    }

    #[test]
    fn test_other_types_are_preserved_in_order() {
        let other = Condition::new("ModelCached", ConditionStatus::True, "Cached", "");
        let mut conditions = vec![other.clone(), Condition::pending("starting")];

        set_condition(&mut conditions, Condition::ready("running"));

        assert_eq!(conditions.len(), 2);
        assert_eq!(conditions[0], other);
        assert_eq!(conditions[1].type_, TYPE_READY);
    }

    #[test]
    fn test_duplicates_collapse_to_one() {
        let mut conditions = vec![Condition::pending("a"), Condition::pending("b")];
        set_condition(&mut conditions, Condition::ready("running"));
        assert_eq!(conditions.len(), 1);
        assert!(find_condition(&conditions, TYPE_READY).unwrap().is_true());
    }
}
