//! Model capability lookup.

use async_trait::async_trait;
use mserve_api::{Kind, Model, ModelCapabilities, TypedObjectReference};
use mserve_id::ObjectKey;

use crate::store::{Api, Lookup, StoreError};

/// Errors from resolving a model reference.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CatalogError {
    #[error("model {0} not found")]
    NotFound(String),

    #[error("worker must reference a Model, got '{0}'")]
    UnsupportedKind(String),

    #[error("invalid model reference: {0}")]
    InvalidReference(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Read-only lookup of what a model can serve.
#[async_trait]
pub trait ModelCatalog: Send + Sync {
    /// Resolves `model` relative to `namespace` when it carries none.
    async fn capabilities(
        &self,
        namespace: &str,
        model: &TypedObjectReference,
    ) -> Result<ModelCapabilities, CatalogError>;
}

/// Catalog backed by `Model` objects in the store.
pub struct StoreModelCatalog {
    models: Api<Model>,
}

impl StoreModelCatalog {
    pub fn new(models: Api<Model>) -> Self {
        Self { models }
    }
}

#[async_trait]
impl ModelCatalog for StoreModelCatalog {
    async fn capabilities(
        &self,
        namespace: &str,
        model: &TypedObjectReference,
    ) -> Result<ModelCapabilities, CatalogError> {
        if !model.kind.is_empty() && model.kind != Kind::Model.as_str() {
            return Err(CatalogError::UnsupportedKind(model.kind.clone()));
        }
        let key = ObjectKey::new(model.namespace_or(namespace), model.name.as_str())
            .map_err(|e| CatalogError::InvalidReference(e.to_string()))?;

        match self.models.lookup(&key).await {
            Lookup::Found(found) => Ok(found.spec.capabilities()),
            Lookup::Missing => Err(CatalogError::NotFound(key.to_string())),
            Lookup::Failed(e) => Err(e.into()),
        }
    }
}
