//! Resolves field paths against a [`Schema`], inferring the type of the
//! addressed field and whether it is required.
use composition_fieldpath::{FieldPath, ParseFieldPathError, Segment};
use snafu::{OptionExt, ResultExt, Snafu};

use crate::schema::{AdditionalProperties, Items, KnownType, Schema, metadata_schema};

#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum ResolveError {
    #[snafu(display("invalid field path: {source}"))]
    ParseFieldPath { source: ParseFieldPathError },

    #[snafu(display("trying to access field {field:?} of not an object: {actual}"))]
    NotAnObject { field: String, actual: String },

    #[snafu(display("accessing by index a {actual} field"))]
    NotAnArray { index: usize, actual: String },

    #[snafu(display("unable to find field: {field}"))]
    FieldNotFound { field: String },

    #[snafu(display("index {index} is out of range, only {len} item schemas are declared"))]
    IndexOutOfRange { index: usize, len: usize },
}

/// The result of resolving a field path.
///
/// A `field_type` of [`None`] means resolution ended somewhere the schema
/// doesn't describe, which is not an error on its own.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResolvedField {
    pub field_type: Option<KnownType>,

    /// True only if every segment along the path is listed in the required
    /// set of its parent.
    pub required: bool,
}

enum Step<'a> {
    Descend { schema: &'a Schema, required: bool },
    Unresolved,
}

/// Parses `path` and resolves it against `root`. An empty path resolves to an
/// unknown, optional field.
pub fn resolve(root: &Schema, path: &str) -> Result<ResolvedField, ResolveError> {
    let path: FieldPath = path.parse().context(ParseFieldPathSnafu)?;
    resolve_segments(root, &path)
}

/// Resolves an already parsed `path` against `root`.
///
/// Paths starting with `metadata` are resolved against the object metadata
/// schema instead.
pub fn resolve_segments(root: &Schema, path: &FieldPath) -> Result<ResolvedField, ResolveError> {
    let (mut current, segments) = match path.first() {
        None => return Ok(ResolvedField::default()),
        Some(Segment::Field(name)) if name == "metadata" => (metadata_schema(), &path[1..]),
        Some(_) => (root, &path[..]),
    };

    let mut required = !segments.is_empty();
    for segment in segments {
        match step(current, segment)? {
            Step::Descend {
                schema,
                required: segment_required,
            } => {
                current = schema;
                required &= segment_required;
            }
            Step::Unresolved => return Ok(ResolvedField::default()),
        }
    }

    Ok(ResolvedField {
        field_type: current.known_type(),
        required,
    })
}

fn step<'a>(parent: &'a Schema, segment: &Segment) -> Result<Step<'a>, ResolveError> {
    match segment {
        Segment::Field(field) => match parent {
            Schema::Object(object) => {
                if let Some(schema) = object.properties.get(field) {
                    return Ok(Step::Descend {
                        schema,
                        required: object.required.contains(field),
                    });
                }

                if object.preserve_unknown_fields {
                    return Ok(Step::Unresolved);
                }

                match &object.additional_properties {
                    AdditionalProperties::Open => Ok(Step::Unresolved),
                    AdditionalProperties::Schema(schema) => Ok(Step::Descend {
                        schema,
                        required: false,
                    }),
                    AdditionalProperties::Disallowed => FieldNotFoundSnafu { field }.fail(),
                }
            }
            // Without a declared type a node is treated like an empty object
            Schema::Unknown => FieldNotFoundSnafu { field }.fail(),
            other => NotAnObjectSnafu {
                field,
                actual: other.type_name(),
            }
            .fail(),
        },
        Segment::Index(index) => match parent {
            Schema::Array(array) => match &array.items {
                Items::None => Ok(Step::Unresolved),
                Items::Single(schema) => Ok(Step::Descend {
                    schema,
                    required: false,
                }),
                Items::Positional(schemas) => {
                    let schema = schemas.get(*index).context(IndexOutOfRangeSnafu {
                        index: *index,
                        len: schemas.len(),
                    })?;
                    Ok(Step::Descend {
                        schema,
                        required: false,
                    })
                }
            },
            other => NotAnArraySnafu {
                index: *index,
                actual: other.type_name(),
            }
            .fail(),
        },
    }
}
