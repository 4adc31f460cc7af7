//! Renders composed resources from their templates and checks the rendered
//! objects against the schema of their type.
use composition_fieldpath::FieldPath;
use serde_json::{Map, Value, json};
use snafu::Snafu;

use crate::{
    crd::{ComposedTemplate, Composition},
    schema::{AdditionalProperties, Items, KnownType, Schema},
};

/// The name given to the composite stub rendered resources are derived from.
pub const COMPOSITE_STUB_NAME: &str = "validation-composite";

/// Fields every object has, even if its schema doesn't declare them.
const IMPLICIT_ROOT_FIELDS: [&str; 3] = ["apiVersion", "kind", "metadata"];

#[derive(Debug, PartialEq, Eq, Snafu)]
#[snafu(display("cannot render composed resource: {message}"))]
pub struct RenderError {
    message: String,
}

impl RenderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Renders a composed resource.
///
/// Implementations write the rendered resource into `composed`.
pub trait Renderer {
    fn render(
        &self,
        composite: &Value,
        composed: &mut Value,
        template: &ComposedTemplate,
        environment: Option<&Value>,
    ) -> Result<(), RenderError>;
}

/// Renders the base of a template without applying any patches.
#[derive(Clone, Copy, Debug, Default)]
pub struct BaseRenderer;

impl Renderer for BaseRenderer {
    fn render(
        &self,
        _composite: &Value,
        composed: &mut Value,
        template: &ComposedTemplate,
        _environment: Option<&Value>,
    ) -> Result<(), RenderError> {
        if !template.base.is_object() {
            return Err(RenderError::new("base must be an object"));
        }
        composed.clone_from(&template.base);
        Ok(())
    }
}

/// Builds a composite resource of the type referenced by `composition`, with
/// every field required by `schema` set to a placeholder value.
pub fn composite_stub(composition: &Composition, schema: &Schema) -> Value {
    let type_ref = &composition.spec.composite_type_ref;

    let mut stub = mock_required_fields(schema);
    if let Value::Object(object) = &mut stub {
        object.insert("apiVersion".to_owned(), json!(type_ref.api_version));
        object.insert("kind".to_owned(), json!(type_ref.kind));
        object.insert(
            "metadata".to_owned(),
            json!({ "name": COMPOSITE_STUB_NAME }),
        );
    }
    stub
}

fn mock_required_fields(schema: &Schema) -> Value {
    match schema {
        Schema::Object(object) => Value::Object(
            object
                .required
                .iter()
                .filter_map(|name| {
                    let property = object.properties.get(name)?;
                    Some((name.clone(), mock_required_fields(property)))
                })
                .collect::<Map<_, _>>(),
        ),
        Schema::Array(_) => json!([]),
        Schema::Scalar(KnownType::String) => json!("default"),
        Schema::Scalar(KnownType::Integer) => json!(1),
        Schema::Scalar(KnownType::Number) => json!(1.0),
        Schema::Scalar(KnownType::Boolean) => json!(true),
        Schema::Scalar(_) | Schema::Unknown => Value::Null,
    }
}

/// Checks the shape of a rendered `object` against its `schema`: types,
/// required properties and undeclared properties. Returns one message per
/// problem.
pub fn check_shape(object: &Value, schema: &Schema) -> Vec<String> {
    let mut problems = Vec::new();
    check_node(object, schema, &FieldPath::default(), &mut problems);
    problems
}

fn check_node(value: &Value, schema: &Schema, path: &FieldPath, problems: &mut Vec<String>) {
    let actual = KnownType::of_value(value);

    match schema {
        Schema::Unknown => {}
        Schema::Scalar(expected) => {
            if !actual.is_equivalent(*expected) {
                report(problems, path, format!("expected {expected}, got {actual}"));
            }
        }
        Schema::Array(array) => {
            let Value::Array(items) = value else {
                report(problems, path, format!("expected array, got {actual}"));
                return;
            };
            for (index, item) in items.iter().enumerate() {
                let item_schema = match &array.items {
                    Items::None => None,
                    Items::Single(schema) => Some(schema.as_ref()),
                    Items::Positional(schemas) => schemas.get(index),
                };
                if let Some(item_schema) = item_schema {
                    check_node(item, item_schema, &child(path, index), problems);
                }
            }
        }
        Schema::Object(object_schema) => {
            let Value::Object(object) = value else {
                if object_schema.typed {
                    report(problems, path, format!("expected object, got {actual}"));
                }
                return;
            };

            for name in &object_schema.required {
                if !object.contains_key(name) {
                    report(problems, &child(path, name.as_str()), "Required value".to_owned());
                }
            }

            for (name, property) in object {
                let property_path = child(path, name.as_str());
                if let Some(property_schema) = object_schema.properties.get(name) {
                    check_node(property, property_schema, &property_path, problems);
                    continue;
                }

                if object_schema.preserve_unknown_fields
                    || (path.is_empty() && IMPLICIT_ROOT_FIELDS.contains(&name.as_str()))
                {
                    continue;
                }

                match &object_schema.additional_properties {
                    AdditionalProperties::Open => {}
                    AdditionalProperties::Schema(schema) => {
                        check_node(property, schema, &property_path, problems);
                    }
                    AdditionalProperties::Disallowed => {
                        report(problems, &property_path, "field not declared in schema".to_owned());
                    }
                }
            }
        }
    }
}

fn child(path: &FieldPath, segment: impl Into<composition_fieldpath::Segment>) -> FieldPath {
    let mut path = path.clone();
    path.push(segment);
    path
}

fn report(problems: &mut Vec<String>, path: &FieldPath, message: String) {
    if path.is_empty() {
        problems.push(format!("<root>: {message}"));
    } else {
        problems.push(format!("{path}: {message}"));
    }
}
