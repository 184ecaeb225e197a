//! Service facades derived from a ready worker.
//!
//! Facades are created once and then left alone: an existing object is never
//! overwritten, so user edits survive. Each facade carries a controller owner
//! reference to its worker and is collected with it.

use std::sync::Arc;

use mserve_api::{
    ApiError, ApiType, CommonSpec, Embedder, FacadeSpec, Kind, Llm, ModelCapabilities,
    ObjectMeta, OwnerReference, Provider, ProviderType, Resource, TypedObjectReference, Worker,
    API_VERSION,
};
use tracing::{debug, info};

use super::{ReconcileError, ReconcileResult};
use crate::store::{Api, Lookup, ObjectStore};

const EMBEDDER_DESCRIPTION: &str = "Embedder created by Worker(OpenAI compatible)";
const LLM_DESCRIPTION: &str = "LLM created by Worker(OpenAI compatible)";

/// Ensures the facades a worker's model calls for.
pub struct DependentSync {
    embedders: Api<Embedder>,
    llms: Api<Llm>,
}

impl DependentSync {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            embedders: Api::new(Arc::clone(&store)),
            llms: Api::new(store),
        }
    }

    /// Ensures one facade per capability. Every kind is attempted; failures
    /// are collected.
    pub async fn sync(
        &self,
        worker: &Worker,
        capabilities: ModelCapabilities,
    ) -> ReconcileResult<()> {
        let mut wanted = Vec::with_capacity(2);
        if capabilities.embedding {
            wanted.push(Kind::Embedder);
        }
        if capabilities.generation {
            wanted.push(Kind::Llm);
        }

        let mut errors = Vec::new();
        for kind in wanted {
            if let Err(e) = self.ensure(worker, kind).await {
                errors.push(e);
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ReconcileError::Dependents(errors))
        }
    }

    /// Creates the facade of `kind` for `worker` if it does not exist.
    pub async fn ensure(&self, worker: &Worker, kind: Kind) -> ReconcileResult<()> {
        match kind {
            Kind::Embedder => {
                ensure_one(&self.embedders, worker, |metadata, spec| Embedder {
                    metadata,
                    spec,
                    status: None,
                })
                .await
            }
            Kind::Llm => {
                ensure_one(&self.llms, worker, |metadata, spec| Llm {
                    metadata,
                    spec,
                    status: None,
                })
                .await
            }
            other => Err(ReconcileError::Validation(format!(
                "{other} is not a dependent kind"
            ))),
        }
    }
}

async fn ensure_one<T: Resource>(
    api: &Api<T>,
    worker: &Worker,
    build: impl FnOnce(ObjectMeta, FacadeSpec) -> T,
) -> ReconcileResult<()> {
    let owner = owner_reference(worker)?;
    let key = worker.key()?.sibling(worker.dependent_name())?;

    match api.lookup(&key).await {
        Lookup::Found(_) => {
            debug!(kind = %T::KIND, dependent = %key, "dependent exists");
            Ok(())
        }
        Lookup::Failed(e) => Err(e.into()),
        Lookup::Missing => {
            let mut metadata = ObjectMeta::named(key.namespace(), key.name());
            metadata.owner_references.push(owner);
            let obj = build(metadata, facade_spec(worker, T::KIND));

            match api.create(&obj).await {
                Ok(_) => {
                    info!(kind = %T::KIND, dependent = %key, "dependent created");
                    Ok(())
                }
                Err(e) if e.is_already_exists() => {
                    debug!(kind = %T::KIND, dependent = %key, "dependent created concurrently");
                    Ok(())
                }
                Err(e) => Err(e.into()),
            }
        }
    }
}

/// Controller owner reference pointing at `worker`.
fn owner_reference(worker: &Worker) -> ReconcileResult<OwnerReference> {
    let uid = worker.metadata.uid.ok_or_else(|| ApiError::MissingField {
        kind: Kind::Worker,
        name: worker.metadata.name.clone(),
        field: "metadata.uid",
    })?;
    Ok(OwnerReference {
        api_version: API_VERSION.to_string(),
        kind: Kind::Worker,
        name: worker.metadata.name.clone(),
        uid,
        controller: true,
        block_owner_deletion: true,
    })
}

/// Spec of a facade served by `worker`.
pub fn facade_spec(worker: &Worker, kind: Kind) -> FacadeSpec {
    let description = match kind {
        Kind::Llm => LLM_DESCRIPTION,
        _ => EMBEDDER_DESCRIPTION,
    };
    FacadeSpec {
        common: CommonSpec {
            creator: worker.spec.common.creator.clone(),
            display_name: Some(worker.spec.model.name.clone()),
            description: Some(description.to_string()),
        },
        api_type: ApiType::OpenAi,
        provider: Provider {
            provider_type: ProviderType::Worker,
            worker: Some(TypedObjectReference {
                kind: Kind::Worker.as_str().to_string(),
                name: worker.metadata.name.clone(),
                namespace: Some(worker.metadata.namespace.clone()),
            }),
        },
    }
}
