//! Error types for object conversion.

use thiserror::Error;

use crate::Kind;

/// Errors that can occur when converting between typed and dynamic objects.
#[derive(Debug, Error, Clone)]
pub enum ApiError {
    /// A dynamic object was converted into the wrong typed resource.
    #[error("kind mismatch: expected {expected}, got {actual}")]
    KindMismatch { expected: Kind, actual: Kind },

    /// The object is missing a field the caller requires.
    #[error("{kind} {name} is missing {field}")]
    MissingField {
        kind: Kind,
        name: String,
        field: &'static str,
    },

    /// The object's namespace or name is not a valid key.
    #[error("invalid object key: {0}")]
    InvalidKey(#[from] mserve_id::IdError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Serialization(err.to_string())
    }
}
