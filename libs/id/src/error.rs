//! Error types for identity parsing and validation.

use thiserror::Error;

/// Errors that can occur when parsing or validating identities.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The input string is empty.
    #[error("identifier cannot be empty")]
    Empty,

    /// A prefixed id carries the wrong prefix.
    #[error("invalid ID prefix: expected '{expected}', got '{actual}'")]
    InvalidPrefix {
        expected: &'static str,
        actual: String,
    },

    /// The separator between the two halves is missing.
    #[error("identifier missing '{0}' separator")]
    MissingSeparator(char),

    /// The ULID portion of a prefixed id is invalid.
    #[error("invalid ULID: {0}")]
    InvalidUlid(String),

    /// A namespace or name segment violates the naming rules.
    #[error("invalid {segment} '{value}': {reason}")]
    InvalidName {
        segment: &'static str,
        value: String,
        reason: &'static str,
    },
}

impl IdError {
    /// Returns true if this error indicates the input was empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, IdError::Empty)
    }
}
