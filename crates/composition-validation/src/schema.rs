//! A read-only view of the OpenAPI v3 schemas found in CRDs, reduced to the
//! parts needed to statically type-check field paths.
use std::{
    collections::{BTreeMap, BTreeSet},
    str::FromStr,
    sync::LazyLock,
};

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::{
    JSONSchemaProps, JSONSchemaPropsOrArray, JSONSchemaPropsOrBool,
};
use snafu::{OptionExt, ResultExt, Snafu};

/// All the known JSON types.
///
/// See <https://datatracker.ietf.org/doc/html/draft-zyp-json-schema-04#section-3.5>.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum KnownType {
    Array,
    Boolean,
    Integer,
    Null,
    Number,
    Object,
    String,
}

impl KnownType {
    /// Returns true if both types are equal, or if `self` is an integer and
    /// `other` is a number. Integer values satisfy a number constraint, the
    /// reverse does not hold.
    pub fn is_equivalent(self, other: Self) -> bool {
        self == other || (self == Self::Integer && other == Self::Number)
    }

    /// Returns the JSON type of a concrete value.
    pub fn of_value(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(_) => Self::Boolean,
            serde_json::Value::Number(number) if number.is_f64() => Self::Number,
            serde_json::Value::Number(_) => Self::Integer,
            serde_json::Value::String(_) => Self::String,
            serde_json::Value::Array(_) => Self::Array,
            serde_json::Value::Object(_) => Self::Object,
        }
    }
}

/// Returns true if `name` is one of the [`KnownType`]s.
pub fn is_known_type(name: &str) -> bool {
    KnownType::from_str(name).is_ok()
}

#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum SchemaError {
    #[snafu(display("unknown schema type {type_name:?}"))]
    UnknownType { type_name: String },

    #[snafu(display("invalid schema for property {name:?}"))]
    InvalidProperty {
        name: String,
        #[snafu(source(from(SchemaError, Box::new)))]
        source: Box<SchemaError>,
    },

    #[snafu(display("invalid schema for additional properties"))]
    InvalidAdditionalProperties {
        #[snafu(source(from(SchemaError, Box::new)))]
        source: Box<SchemaError>,
    },

    #[snafu(display("invalid schema for array items"))]
    InvalidItems {
        #[snafu(source(from(SchemaError, Box::new)))]
        source: Box<SchemaError>,
    },
}

/// A schema node.
///
/// Nodes without a declared type either become an untyped [`Schema::Object`]
/// (if they declare object features, like properties) or [`Schema::Unknown`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Schema {
    Object(ObjectSchema),
    Array(ArraySchema),
    Scalar(KnownType),
    Unknown,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObjectSchema {
    pub properties: BTreeMap<String, Schema>,
    pub required: BTreeSet<String>,
    pub additional_properties: AdditionalProperties,
    pub preserve_unknown_fields: bool,

    /// Whether `type: object` was declared. Untyped objects can be traversed,
    /// but their own type is unknown.
    pub typed: bool,
}

/// How an object treats properties it doesn't declare.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum AdditionalProperties {
    #[default]
    Disallowed,
    Open,
    Schema(Box<Schema>),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ArraySchema {
    pub items: Items,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Items {
    #[default]
    None,
    Single(Box<Schema>),
    Positional(Vec<Schema>),
}

impl Schema {
    /// The type reported when a field path ends at this node, [`None`] if
    /// it can't be determined.
    pub fn known_type(&self) -> Option<KnownType> {
        match self {
            Self::Object(object) if object.typed => Some(KnownType::Object),
            Self::Object(_) | Self::Unknown => None,
            Self::Array(_) => Some(KnownType::Array),
            Self::Scalar(scalar) => Some(*scalar),
        }
    }

    /// Human readable type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self.known_type() {
            Some(known) => known.into(),
            None => "untyped",
        }
    }
}

impl TryFrom<&JSONSchemaProps> for Schema {
    type Error = SchemaError;

    fn try_from(props: &JSONSchemaProps) -> Result<Self, Self::Error> {
        let Some(type_name) = props.type_.as_deref() else {
            let has_object_features = props.properties.is_some()
                || props.additional_properties.is_some()
                || props.x_kubernetes_preserve_unknown_fields.unwrap_or(false);

            return if has_object_features {
                Ok(Self::Object(object_schema(props, false)?))
            } else {
                Ok(Self::Unknown)
            };
        };

        let known_type = KnownType::from_str(type_name)
            .ok()
            .context(UnknownTypeSnafu { type_name })?;

        Ok(match known_type {
            KnownType::Object => Self::Object(object_schema(props, true)?),
            KnownType::Array => Self::Array(ArraySchema {
                items: items(props.items.as_ref())?,
            }),
            scalar => Self::Scalar(scalar),
        })
    }
}

fn object_schema(props: &JSONSchemaProps, typed: bool) -> Result<ObjectSchema, SchemaError> {
    let properties = props
        .properties
        .iter()
        .flatten()
        .map(|(name, prop)| {
            Schema::try_from(prop)
                .context(InvalidPropertySnafu { name })
                .map(|schema| (name.clone(), schema))
        })
        .collect::<Result<BTreeMap<_, _>, _>>()?;

    let additional_properties = match &props.additional_properties {
        None | Some(JSONSchemaPropsOrBool::Bool(false)) => AdditionalProperties::Disallowed,
        Some(JSONSchemaPropsOrBool::Bool(true)) => AdditionalProperties::Open,
        Some(JSONSchemaPropsOrBool::Schema(schema)) => AdditionalProperties::Schema(Box::new(
            Schema::try_from(schema.as_ref()).context(InvalidAdditionalPropertiesSnafu)?,
        )),
    };

    Ok(ObjectSchema {
        properties,
        required: props.required.iter().flatten().cloned().collect(),
        additional_properties,
        preserve_unknown_fields: props.x_kubernetes_preserve_unknown_fields.unwrap_or(false),
        typed,
    })
}

fn items(items: Option<&JSONSchemaPropsOrArray>) -> Result<Items, SchemaError> {
    Ok(match items {
        None => Items::None,
        Some(JSONSchemaPropsOrArray::Schema(schema)) => Items::Single(Box::new(
            Schema::try_from(schema.as_ref()).context(InvalidItemsSnafu)?,
        )),
        Some(JSONSchemaPropsOrArray::Schemas(schemas)) => Items::Positional(
            schemas
                .iter()
                .map(Schema::try_from)
                .collect::<Result<Vec<_>, _>>()
                .context(InvalidItemsSnafu)?,
        ),
    })
}

static METADATA_SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    let string_map = || {
        Schema::Object(ObjectSchema {
            additional_properties: AdditionalProperties::Schema(Box::new(Schema::Scalar(
                KnownType::String,
            ))),
            typed: true,
            ..ObjectSchema::default()
        })
    };

    Schema::Object(ObjectSchema {
        properties: BTreeMap::from([
            ("name".to_owned(), Schema::Scalar(KnownType::String)),
            ("namespace".to_owned(), Schema::Scalar(KnownType::String)),
            ("uid".to_owned(), Schema::Scalar(KnownType::String)),
            ("labels".to_owned(), string_map()),
            ("annotations".to_owned(), string_map()),
        ]),
        additional_properties: AdditionalProperties::Open,
        typed: true,
        ..ObjectSchema::default()
    })
});

/// The object metadata schema. CRDs usually don't describe `metadata`, but
/// patches commonly read from fields like `metadata.uid`.
pub fn metadata_schema() -> &'static Schema {
    &METADATA_SCHEMA
}
