//! # mserve-api
//!
//! Object model shared by the controller and the object store.
//!
//! ## Design Principles
//!
//! - Every stored object has `metadata`, `spec` and `status`
//! - `spec` is desired state owned by users; `status` is observed state owned
//!   by the controller
//! - The store persists objects dynamically (`DynamicObject`); typed access
//!   goes through the `Resource` trait
//!
//! ## Kinds
//!
//! - `Worker`: a model-serving workload (the primary object)
//! - `Embedder`, `Llm`: service facades derived from a ready worker
//! - `Model`: model metadata, read for capability flags

mod condition;
mod error;
mod facade;
mod meta;
mod model;
mod resource;
mod worker;

pub use condition::*;
pub use error::ApiError;
pub use facade::*;
pub use meta::*;
pub use model::*;
pub use resource::*;
pub use worker::*;

/// API group of every mserve kind.
pub const GROUP: &str = "mserve.dev";

/// API version string written into owner references.
pub const API_VERSION: &str = "mserve.dev/v1alpha1";
