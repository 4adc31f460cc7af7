//! Field errors reported back to users, shaped like the Kubernetes
//! apimachinery `field.Error` so they read the same as errors emitted by the
//! API server itself.
//!
//! Every problem found while validating a Composition is turned into a
//! [`FieldError`], which points at the offending field through a [`Path`].
//! Validation never stops at the first problem; all errors are collected into
//! [`FieldErrors`].
use std::{
    fmt::{self, Display},
    ops::Deref,
};

use composition_fieldpath::{FieldPath, Segment};
use serde::Serialize;

/// The path of a field inside the validated object, e.g.
/// `spec.resources[0].patches[1].fromFieldPath`.
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq)]
pub struct Path(FieldPath);

impl Path {
    /// Creates a new path starting with the field `root`.
    pub fn new(root: &str) -> Self {
        Self(FieldPath::from(vec![Segment::field(root)]))
    }

    /// Returns a new path pointing at the field `name` of this path.
    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut path = self.0.clone();
        path.push(Segment::Field(name.into()));
        Self(path)
    }

    /// Returns a new path pointing at the array position `index` of this path.
    pub fn index(&self, index: usize) -> Self {
        let mut path = self.0.clone();
        path.push(index);
        Self(path)
    }

    /// Returns a new path pointing at the map entry `key` of this path. Keys
    /// containing dots are rendered in brackets.
    pub fn key(&self, key: impl Into<String>) -> Self {
        self.child(key)
    }

    /// Appends a path which is relative to this one.
    pub fn join(&self, relative: &Self) -> Self {
        Self(self.0.join(&relative.0))
    }
}

impl Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The kind of a [`FieldError`].
///
/// [`ErrorKind::Internal`] errors are caused by the environment (e.g. a
/// missing CRD) and not by the content of the validated object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
pub enum ErrorKind {
    #[strum(serialize = "Invalid value")]
    Invalid,

    #[strum(serialize = "Duplicate value")]
    Duplicate,

    #[strum(serialize = "Required value")]
    Required,

    #[strum(serialize = "Internal error")]
    Internal,
}

/// A single validation error attributed to a field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldError {
    pub kind: ErrorKind,
    pub field: Path,
    pub bad_value: Option<serde_json::Value>,
    pub detail: String,
}

impl FieldError {
    pub fn invalid(field: Path, value: impl Serialize, detail: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Invalid,
            field,
            bad_value: serde_json::to_value(value).ok(),
            detail: detail.into(),
        }
    }

    pub fn duplicate(field: Path, value: impl Serialize, detail: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Duplicate,
            field,
            bad_value: serde_json::to_value(value).ok(),
            detail: detail.into(),
        }
    }

    pub fn required(field: Path, detail: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Required,
            field,
            bad_value: None,
            detail: detail.into(),
        }
    }

    pub fn internal(field: Path, detail: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Internal,
            field,
            bad_value: None,
            detail: detail.into(),
        }
    }
}

impl Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.kind)?;
        if let Some(value) = &self.bad_value {
            write!(f, ": {value}")?;
        }
        if !self.detail.is_empty() {
            write!(f, ": {}", self.detail)?;
        }
        Ok(())
    }
}

impl std::error::Error for FieldError {}

/// A collection of errors discovered during validation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldErrors(Vec<FieldError>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: FieldError) {
        self.0.push(error);
    }

    /// Returns [`Ok`] if no errors were collected.
    pub fn into_result(self) -> Result<(), Self> {
        if self.0.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            let prefix = match i {
                0 => "",
                _ => ", ",
            };
            write!(f, "{prefix}{error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for FieldErrors {}

impl Deref for FieldErrors {
    type Target = [FieldError];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<FieldError>> for FieldErrors {
    fn from(errors: Vec<FieldError>) -> Self {
        Self(errors)
    }
}

impl Extend<FieldError> for FieldErrors {
    fn extend<T: IntoIterator<Item = FieldError>>(&mut self, iter: T) {
        self.0.extend(iter);
    }
}

impl FromIterator<FieldError> for FieldErrors {
    fn from_iter<T: IntoIterator<Item = FieldError>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for FieldErrors {
    type IntoIter = std::vec::IntoIter<FieldError>;
    type Item = FieldError;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(Path::new("spec").child("resources").index(0).child("name"), "spec.resources[0].name")]
    #[case(Path::new("spec").child("resources").index(2).child("patches").index(1), "spec.resources[2].patches[1]")]
    #[case(
        Path::new("metadata").child("annotations").key("crossplane.io/composition-validation-mode"),
        "metadata.annotations[crossplane.io/composition-validation-mode]"
    )]
    fn path_display(#[case] path: Path, #[case] expected: &str) {
        assert_eq!(path.to_string(), expected);
    }

    #[test]
    fn join() {
        let path = Path::new("spec")
            .child("resources")
            .index(0)
            .join(&Path::new("combine").child("strategy"));
        assert_eq!(path.to_string(), "spec.resources[0].combine.strategy");
    }

    #[test]
    fn display() {
        let errors = FieldErrors::from(vec![
            FieldError::duplicate(
                Path::new("spec").child("resources").index(1).child("name"),
                "cool",
                "resource template names must be unique within their Composition",
            ),
            FieldError::required(Path::new("spec").child("functions").index(0).child("container"), ""),
        ]);

        assert_eq!(
            errors.to_string(),
            "spec.resources[1].name: Duplicate value: \"cool\": resource template names must be unique within their Composition, \
             spec.functions[0].container: Required value"
        );
    }

    #[test]
    fn into_result() {
        assert!(FieldErrors::new().into_result().is_ok());
        assert!(
            FieldErrors::from(vec![FieldError::internal(Path::new("spec"), "boom")])
                .into_result()
                .is_err()
        );
    }
}
