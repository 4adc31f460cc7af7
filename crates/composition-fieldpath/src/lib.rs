//! This library provides strongly-typed field path expressions, as used by
//! Composition patches to address a value inside a Kubernetes object. A path
//! consists of field segments separated by dots and index segments enclosed
//! in square brackets, for example `spec.forProvider.tags[0].key`.
//!
//! ## Usage
//!
//! Paths can be parsed and validated from [`str`] using Rust's standard
//! [`FromStr`](std::str::FromStr) trait.
//!
//! ```
//! # use std::str::FromStr;
//! use composition_fieldpath::{FieldPath, Segment};
//!
//! let path = FieldPath::from_str("spec.containers[0].name")
//!     .expect("valid field path");
//!
//! assert_eq!(path.segments(), &[
//!     Segment::field("spec"),
//!     Segment::field("containers"),
//!     Segment::Index(0),
//!     Segment::field("name"),
//! ]);
//! ```
//!
//! Field names which contain dots, like most label keys, are written in
//! brackets:
//!
//! ```
//! use composition_fieldpath::{FieldPath, Segment};
//!
//! let path: FieldPath = "metadata.labels[app.kubernetes.io/name]".parse()
//!     .expect("valid field path");
//!
//! assert_eq!(path.last(), Some(&Segment::field("app.kubernetes.io/name")));
//! assert_eq!(path.to_string(), "metadata.labels[app.kubernetes.io/name]");
//! ```

mod path;
mod segment;

pub use path::*;
pub use segment::*;
