//! The `Model` kind, read for capability flags.

use serde::{Deserialize, Serialize};

use crate::{CommonSpec, Condition, Kind, ObjectMeta, Resource};

/// Capability tag for text-generation models.
pub const MODEL_TYPE_LLM: &str = "llm";

/// Capability tag for embedding models.
pub const MODEL_TYPE_EMBEDDING: &str = "embedding";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSpec {
    #[serde(flatten)]
    pub common: CommonSpec,

    /// Comma-separated capability tags, e.g. `llm,embedding`.
    #[serde(default)]
    pub types: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub metadata: ObjectMeta,
    pub spec: ModelSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ModelStatus>,
}

/// What a model can serve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModelCapabilities {
    pub embedding: bool,
    pub generation: bool,
}

impl ModelSpec {
    fn has_type(&self, tag: &str) -> bool {
        self.types
            .split(',')
            .any(|t| t.trim().eq_ignore_ascii_case(tag))
    }

    pub fn capabilities(&self) -> ModelCapabilities {
        ModelCapabilities {
            embedding: self.has_type(MODEL_TYPE_EMBEDDING),
            generation: self.has_type(MODEL_TYPE_LLM),
        }
    }
}

impl Resource for Model {
    const KIND: Kind = Kind::Model;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}
