//! Kinds, the typed `Resource` trait and the dynamic wire form.

use mserve_id::{IdError, ObjectKey};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{ApiError, ObjectMeta};

/// Every kind known to mserve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Kind {
    Worker,
    Embedder,
    #[serde(rename = "LLM")]
    Llm,
    Model,
}

impl Kind {
    pub const ALL: [Kind; 4] = [Kind::Worker, Kind::Embedder, Kind::Llm, Kind::Model];

    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Worker => "Worker",
            Kind::Embedder => "Embedder",
            Kind::Llm => "LLM",
            Kind::Model => "Model",
        }
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed object stored under a fixed kind.
///
/// Implementors serialize as `{ "metadata": .., "spec": .., "status": .. }`.
pub trait Resource: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const KIND: Kind;

    fn metadata(&self) -> &ObjectMeta;

    fn metadata_mut(&mut self) -> &mut ObjectMeta;

    fn key(&self) -> Result<ObjectKey, IdError> {
        self.metadata().key()
    }

    /// Converts into the store's dynamic representation.
    fn to_dynamic(&self) -> Result<DynamicObject, ApiError> {
        let mut value = serde_json::to_value(self)?;
        let mut take = |field: &str| {
            value
                .get_mut(field)
                .map(Value::take)
                .unwrap_or(Value::Null)
        };
        let spec = take("spec");
        let status = take("status");
        Ok(DynamicObject {
            kind: Self::KIND,
            metadata: self.metadata().clone(),
            spec,
            status,
        })
    }

    /// Converts from the store's dynamic representation.
    fn from_dynamic(obj: DynamicObject) -> Result<Self, ApiError> {
        if obj.kind != Self::KIND {
            return Err(ApiError::KindMismatch {
                expected: Self::KIND,
                actual: obj.kind,
            });
        }
        let mut map = Map::new();
        map.insert("metadata".into(), serde_json::to_value(&obj.metadata)?);
        map.insert("spec".into(), obj.spec);
        map.insert("status".into(), obj.status);
        Ok(serde_json::from_value(Value::Object(map))?)
    }
}

/// Kind-tagged object with an untyped spec and status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicObject {
    pub kind: Kind,
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: Value,
    #[serde(default)]
    pub status: Value,
}

impl DynamicObject {
    pub fn key(&self) -> Result<ObjectKey, IdError> {
        self.metadata.key()
    }
}

/// A change observed on the store's watch channel.
///
/// `Modified` carries both snapshots so filters can compare them without
/// another round trip.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent<T> {
    Added(T),
    Modified { old: T, new: T },
    Deleted(T),
}

impl<T> WatchEvent<T> {
    /// The most recent snapshot carried by the event.
    pub fn object(&self) -> &T {
        match self {
            WatchEvent::Added(obj) | WatchEvent::Deleted(obj) => obj,
            WatchEvent::Modified { new, .. } => new,
        }
    }

    /// Converts both snapshots, failing if either conversion fails.
    pub fn try_map<U, E>(self, mut f: impl FnMut(T) -> Result<U, E>) -> Result<WatchEvent<U>, E> {
        Ok(match self {
            WatchEvent::Added(obj) => WatchEvent::Added(f(obj)?),
            WatchEvent::Modified { old, new } => WatchEvent::Modified {
                old: f(old)?,
                new: f(new)?,
            },
            WatchEvent::Deleted(obj) => WatchEvent::Deleted(f(obj)?),
        })
    }
}

impl WatchEvent<DynamicObject> {
    pub fn kind(&self) -> Kind {
        self.object().kind
    }

    /// Converts a dynamic event into a typed one.
    pub fn typed<R: Resource>(self) -> Result<WatchEvent<R>, ApiError> {
        self.try_map(R::from_dynamic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Model, ModelSpec, Worker};

    fn model() -> Model {
        Model {
            metadata: ObjectMeta::named("default", "bge"),
            spec: ModelSpec {
                types: "embedding".into(),
                ..Default::default()
            },
            status: None,
        }
    }

    #[test]
    fn test_dynamic_conversion_splits_spec_and_status() {
        let dynamic = model().to_dynamic().unwrap();
        assert_eq!(dynamic.kind, Kind::Model);
        assert_eq!(dynamic.spec["types"], "embedding");
        assert!(dynamic.status.is_null());

        let back = Model::from_dynamic(dynamic).unwrap();
        assert_eq!(back, model());
    }

    #[test]
    fn test_from_dynamic_rejects_other_kind() {
        let dynamic = model().to_dynamic().unwrap();
        let err = Worker::from_dynamic(dynamic).unwrap_err();
        assert!(matches!(
            err,
            ApiError::KindMismatch {
                expected: Kind::Worker,
                actual: Kind::Model
            }
        ));
    }

    #[test]
    fn test_kind_wire_names() {
        assert_eq!(serde_json::to_string(&Kind::Llm).unwrap(), "\"LLM\"");
        assert_eq!(Kind::Embedder.to_string(), "Embedder");
    }

    #[test]
    fn test_watch_event_typed_keeps_both_snapshots() {
        let old = model();
        let mut new = model();
        new.spec.types = "embedding,llm".into();
        let event = WatchEvent::Modified {
            old: old.to_dynamic().unwrap(),
            new: new.to_dynamic().unwrap(),
        };
        assert_eq!(event.kind(), Kind::Model);

        match event.typed::<Model>().unwrap() {
            WatchEvent::Modified { old: o, new: n } => {
                assert_eq!(o.spec.types, "embedding");
                assert_eq!(n.spec.types, "embedding,llm");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
