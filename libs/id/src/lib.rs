//! # mserve-id
//!
//! Identity types shared by every mserve component.
//!
//! ## Design Principles
//!
//! - Objects are addressed by `namespace/name`; names are user-controlled
//! - Uids are store-assigned and never reused, so owner references survive
//!   delete-and-recreate of an object with the same name
//! - Resource versions are opaque; only the store that issued one may
//!   interpret it
//!
//! ## Formats
//!
//! - `ObjectKey`: `team-a/llama-7b`
//! - `Uid`: `uid_01HV4Z2WQXKJNM8GPQY6VBKC3D`
//! - `ReconcileId`: `rec_01HV4Z3MXNKPQR9HSTZ7WCLD4E`

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;
