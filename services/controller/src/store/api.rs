//! Typed access to the object store.

use std::marker::PhantomData;
use std::sync::Arc;

use mserve_api::{DynamicObject, Resource};
use mserve_id::{ObjectKey, ResourceVersion};
use serde::Serialize;

use super::{ObjectStore, StoreError, StoreResult};

/// Outcome of a point lookup.
#[derive(Debug)]
pub enum Lookup<T> {
    Found(T),
    Missing,
    Failed(StoreError),
}

/// Typed handle on one kind in the store.
pub struct Api<T> {
    store: Arc<dyn ObjectStore>,
    _kind: PhantomData<fn() -> T>,
}

impl<T> Clone for Api<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            _kind: PhantomData,
        }
    }
}

impl<T: Resource> Api<T> {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            _kind: PhantomData,
        }
    }

    pub async fn get(&self, key: &ObjectKey) -> StoreResult<T> {
        let obj = self.store.get(T::KIND, key).await?;
        Ok(T::from_dynamic(obj)?)
    }

    /// Fetches without decoding, for objects whose spec may not parse.
    pub async fn get_dynamic(&self, key: &ObjectKey) -> StoreResult<DynamicObject> {
        self.store.get(T::KIND, key).await
    }

    /// Like `get`, with not-found folded into [`Lookup::Missing`].
    pub async fn lookup(&self, key: &ObjectKey) -> Lookup<T> {
        match self.get(key).await {
            Ok(obj) => Lookup::Found(obj),
            Err(e) if e.is_not_found() => Lookup::Missing,
            Err(e) => Lookup::Failed(e),
        }
    }

    pub async fn list(&self, namespace: Option<&str>) -> StoreResult<Vec<T>> {
        self.store
            .list(T::KIND, namespace)
            .await?
            .into_iter()
            .map(|obj| T::from_dynamic(obj).map_err(StoreError::from))
            .collect()
    }

    pub async fn create(&self, obj: &T) -> StoreResult<T> {
        let created = self.store.create(obj.to_dynamic()?).await?;
        Ok(T::from_dynamic(created)?)
    }

    /// Writes metadata and spec, conditional on the object's resource version.
    pub async fn update(&self, obj: &T) -> StoreResult<T> {
        let updated = self.store.update(obj.to_dynamic()?).await?;
        Ok(T::from_dynamic(updated)?)
    }

    /// `update` on the undecoded form. Metadata writes only need the envelope.
    pub async fn update_dynamic(&self, obj: &DynamicObject) -> StoreResult<DynamicObject> {
        self.store.update(obj.clone()).await
    }

    /// Replaces the status, conditional on `resource_version` when given.
    ///
    /// Returns the stored object undecoded so a status can be written to an
    /// object whose spec does not parse.
    pub async fn patch_status<S: Serialize>(
        &self,
        key: &ObjectKey,
        status: &S,
        resource_version: Option<&ResourceVersion>,
    ) -> StoreResult<DynamicObject> {
        let status = serde_json::to_value(status)
            .map_err(|e| StoreError::Invalid(format!("unserializable status: {e}")))?;
        self.store
            .patch_status(T::KIND, key, status, resource_version)
            .await
    }

    pub async fn delete(&self, key: &ObjectKey) -> StoreResult<()> {
        self.store.delete(T::KIND, key).await
    }
}
