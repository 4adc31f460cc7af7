//! Static validation of Compositions.
//!
//! A Composition describes how a composite resource is assembled from a set
//! of composed resource templates, with patches copying (and transforming)
//! values between the composite and the composed resources. This crate checks
//! Compositions without rendering any real resources:
//!
//! - structural rules, like unique template names ([`logical`]),
//! - every patch against the schemas of the composite and composed resource
//!   types, including the types flowing through transform chains
//!   ([`patch`], [`transform`]),
//! - connection details and readiness checks ([`template`]),
//! - optionally, rendered composed resources ([`render`]).
//!
//! The entry point is the [`CompositionValidator`](validator::CompositionValidator),
//! which reports all problems as Kubernetes style [field errors](error::FieldError).
//! Schemas are provided by a [`SchemaLookup`](lookup::SchemaLookup), usually a
//! [`SchemaMap`](lookup::SchemaMap) built from CRDs.
pub mod admission;
pub mod crd;
pub mod error;
pub mod logical;
pub mod lookup;
pub mod mode;
pub mod patch;
pub mod render;
pub mod resolver;
pub mod schema;
pub mod template;
pub mod transform;
pub mod validator;

// External re-exports
pub use k8s_openapi;
pub use kube;
// Internal re-exports
pub use composition_fieldpath as fieldpath;
