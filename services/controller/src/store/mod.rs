//! Object store interface.
//!
//! The store persists versioned objects of every kind and broadcasts each
//! change to watchers. Its contract:
//!
//! - Writes that carry a resource version are conditional on it; a stale
//!   version fails with [`StoreError::Conflict`]
//! - `update` never changes status; `patch_status` never changes anything else
//! - `generation` is bumped whenever `spec` changes
//! - Deleting an object with finalizers only sets its deletion timestamp; the
//!   object is purged once its last finalizer is removed
//! - Purging an object garbage-collects every object that names it as owner

mod api;
mod memory;

pub use api::{Api, Lookup};
pub use memory::{MemoryStore, StoreOp};

use async_trait::async_trait;
use mserve_api::{ApiError, DynamicObject, Kind, WatchEvent};
use mserve_id::{IdError, ObjectKey, ResourceVersion};
use serde_json::Value;
use tokio::sync::broadcast;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by the object store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} {key} not found")]
    NotFound { kind: Kind, key: ObjectKey },

    /// The write carried a stale resource version.
    #[error("conflict writing {kind} {key}: {reason}")]
    Conflict {
        kind: Kind,
        key: ObjectKey,
        reason: String,
    },

    #[error("{kind} {key} already exists")]
    AlreadyExists { kind: Kind, key: ObjectKey },

    /// Transient failure; the call may succeed if retried.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The request can never succeed as written.
    #[error("invalid request: {0}")]
    Invalid(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists { .. })
    }
}

impl From<ApiError> for StoreError {
    fn from(err: ApiError) -> Self {
        StoreError::Invalid(err.to_string())
    }
}

impl From<IdError> for StoreError {
    fn from(err: IdError) -> Self {
        StoreError::Invalid(err.to_string())
    }
}

/// Versioned, watchable storage for dynamic objects.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, kind: Kind, key: &ObjectKey) -> StoreResult<DynamicObject>;

    /// Lists objects of a kind, optionally restricted to one namespace.
    async fn list(&self, kind: Kind, namespace: Option<&str>) -> StoreResult<Vec<DynamicObject>>;

    /// Creates an object. Store-owned metadata in `obj` is ignored.
    async fn create(&self, obj: DynamicObject) -> StoreResult<DynamicObject>;

    /// Replaces metadata and spec. Status is left untouched.
    async fn update(&self, obj: DynamicObject) -> StoreResult<DynamicObject>;

    /// Replaces status, conditional on `resource_version` when given.
    async fn patch_status(
        &self,
        kind: Kind,
        key: &ObjectKey,
        status: Value,
        resource_version: Option<&ResourceVersion>,
    ) -> StoreResult<DynamicObject>;

    /// Requests deletion.
    async fn delete(&self, kind: Kind, key: &ObjectKey) -> StoreResult<()>;

    /// Subscribes to changes of every kind.
    fn watch(&self) -> broadcast::Receiver<WatchEvent<DynamicObject>>;
}
