//! Object metadata shared by all kinds.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use mserve_id::{IdError, ObjectKey, ResourceVersion, Uid};
use serde::{Deserialize, Serialize};

use crate::Kind;

/// Metadata carried by every stored object.
///
/// `uid`, `resource_version`, `generation`, `creation_timestamp` and
/// `deletion_timestamp` are assigned by the store; writes from clients
/// never change them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,

    pub namespace: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<Uid>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<ResourceVersion>,

    /// Bumped by the store whenever `spec` changes.
    #[serde(default)]
    pub generation: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub finalizers: Vec<String>,

    /// Set by the store when deletion was requested while finalizers remain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,
}

impl ObjectMeta {
    /// Metadata for a new object that has not been stored yet.
    pub fn named(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn key(&self) -> Result<ObjectKey, IdError> {
        ObjectKey::new(self.namespace.clone(), self.name.clone())
    }

    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers.iter().any(|f| f == finalizer)
    }

    /// Adds a finalizer. Returns true if it was not already present.
    pub fn add_finalizer(&mut self, finalizer: &str) -> bool {
        if self.has_finalizer(finalizer) {
            return false;
        }
        self.finalizers.push(finalizer.to_string());
        true
    }

    /// Removes a finalizer. Returns true if it was present.
    pub fn remove_finalizer(&mut self, finalizer: &str) -> bool {
        let before = self.finalizers.len();
        self.finalizers.retain(|f| f != finalizer);
        self.finalizers.len() != before
    }

    pub fn is_deleting(&self) -> bool {
        self.deletion_timestamp.is_some()
    }

    /// The owner reference marked as managing controller, if any.
    pub fn controller_owner(&self) -> Option<&OwnerReference> {
        self.owner_references.iter().find(|r| r.controller)
    }

    pub fn is_owned_by(&self, uid: &Uid) -> bool {
        self.owner_references.iter().any(|r| &r.uid == uid)
    }
}

/// Back-reference from a dependent object to the object that owns it.
///
/// Deleting the owner garbage-collects every object referencing its uid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    pub api_version: String,
    pub kind: Kind,
    pub name: String,
    pub uid: Uid,
    #[serde(default)]
    pub controller: bool,
    #[serde(default)]
    pub block_owner_deletion: bool,
}

/// Reference to another object by kind and name.
///
/// A missing namespace means "same namespace as the referrer".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedObjectReference {
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl TypedObjectReference {
    pub fn namespace_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.namespace.as_deref().unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_finalizer_is_idempotent() {
        let mut meta = ObjectMeta::named("default", "w");
        assert!(meta.add_finalizer("mserve.dev/finalizer"));
        assert!(!meta.add_finalizer("mserve.dev/finalizer"));
        assert_eq!(meta.finalizers.len(), 1);
    }

    #[test]
    fn test_remove_finalizer_keeps_others() {
        let mut meta = ObjectMeta::named("default", "w");
        meta.finalizers = vec!["a".into(), "mserve.dev/finalizer".into(), "b".into()];
        assert!(meta.remove_finalizer("mserve.dev/finalizer"));
        assert!(!meta.remove_finalizer("mserve.dev/finalizer"));
        assert_eq!(meta.finalizers, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_controller_owner() {
        let uid = Uid::new();
        let mut meta = ObjectMeta::named("default", "w-worker");
        meta.owner_references.push(OwnerReference {
            api_version: crate::API_VERSION.to_string(),
            kind: Kind::Worker,
            name: "w".into(),
            uid,
            controller: true,
            block_owner_deletion: true,
        });
        assert_eq!(meta.controller_owner().map(|r| r.name.as_str()), Some("w"));
        assert!(meta.is_owned_by(&uid));
        assert!(!meta.is_owned_by(&Uid::new()));
    }

    #[test]
    fn test_empty_fields_are_omitted() {
        let meta = ObjectMeta::named("default", "w");
        let json = serde_json::to_value(&meta).unwrap();
        assert!(json.get("labels").is_none());
        assert!(json.get("finalizers").is_none());
        assert!(json.get("deletionTimestamp").is_none());
    }
}
