use std::fmt::{self, Display};

/// A single segment of a [`FieldPath`](crate::FieldPath).
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Segment {
    /// A named field of an object, e.g. `spec`.
    Field(String),

    /// A position inside an array, e.g. `[0]`.
    Index(usize),
}

impl Segment {
    /// Creates a new field segment.
    pub fn field(name: impl Into<String>) -> Self {
        Self::Field(name.into())
    }

    /// Returns the field name if this is a [`Segment::Field`].
    pub fn as_field(&self) -> Option<&str> {
        match self {
            Self::Field(name) => Some(name),
            Self::Index(_) => None,
        }
    }

    /// Returns the position if this is a [`Segment::Index`].
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Self::Field(_) => None,
            Self::Index(index) => Some(*index),
        }
    }

    /// Field names containing any of these characters can only be expressed
    /// using the bracket notation.
    pub(crate) fn needs_brackets(name: &str) -> bool {
        name.is_empty()
            || name.contains(['.', '[', ']'])
            || name.bytes().all(|byte| byte.is_ascii_digit())
    }
}

impl Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(name) if Self::needs_brackets(name) => {
                if name.bytes().all(|byte| byte.is_ascii_digit()) {
                    write!(f, "['{name}']")
                } else {
                    write!(f, "[{name}]")
                }
            }
            Self::Field(name) => f.write_str(name),
            Self::Index(index) => write!(f, "[{index}]"),
        }
    }
}

impl From<usize> for Segment {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl From<String> for Segment {
    fn from(name: String) -> Self {
        Self::Field(name)
    }
}

impl From<&str> for Segment {
    fn from(name: &str) -> Self {
        Self::field(name)
    }
}
