//! Service facades derived from a ready worker.
//!
//! `Embedder` and `Llm` expose a worker's OpenAI-compatible endpoint to the
//! rest of the platform. Both share one spec shape.

use serde::{Deserialize, Serialize};

use crate::{CommonSpec, Kind, ObjectMeta, Resource, TypedObjectReference};

/// Who serves the facade.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderType {
    /// Served by an mserve worker in the cluster.
    #[default]
    Worker,
    /// Served by an external API.
    ThirdParty,
}

/// Wire protocol spoken by the facade.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiType {
    #[default]
    OpenAi,
    ZhipuAi,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provider {
    #[serde(default)]
    pub provider_type: ProviderType,

    /// Set when `provider_type` is `worker`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker: Option<TypedObjectReference>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacadeSpec {
    #[serde(flatten)]
    pub common: CommonSpec,

    #[serde(rename = "type", default)]
    pub api_type: ApiType,

    #[serde(default)]
    pub provider: Provider,
}

/// Embedding service backed by a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedder {
    pub metadata: ObjectMeta,
    pub spec: FacadeSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<serde_json::Value>,
}

/// Language-model service backed by a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Llm {
    pub metadata: ObjectMeta,
    pub spec: FacadeSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<serde_json::Value>,
}

impl Resource for Embedder {
    const KIND: Kind = Kind::Embedder;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

impl Resource for Llm {
    const KIND: Kind = Kind::Llm;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}
