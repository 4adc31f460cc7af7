//! The Composition custom resource, as far as it is relevant for validation.
use std::str::FromStr;

use kube::{
    CustomResource,
    core::{GroupVersion, GroupVersionKind, gvk::ParseGroupVersionError},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ResultExt, Snafu};

mod patch;
mod transform;

pub use patch::*;
pub use transform::*;

#[derive(Debug, Snafu)]
pub enum BaseObjectError {
    #[snafu(display("base object must be an object"))]
    NotAnObject,

    #[snafu(display("base object is missing {field:?}"))]
    MissingField { field: &'static str },

    #[snafu(display("failed to parse apiVersion {api_version:?}"))]
    ParseApiVersion {
        source: ParseGroupVersionError,
        api_version: String,
    },
}

/// Renders base objects as preserved unknown fields, they are arbitrary
/// Kubernetes objects.
pub fn raw_object_schema(_: &mut schemars::SchemaGenerator) -> schemars::Schema {
    schemars::json_schema!({
        "type": "object",
        "x-kubernetes-preserve-unknown-fields": true,
    })
}

/// A Composition specifies how a composite resource should be composed.
#[derive(Clone, CustomResource, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[kube(
    group = "apiextensions.crossplane.io",
    version = "v1",
    kind = "Composition",
    plural = "compositions",
    crates(
        kube_core = "kube::core",
        k8s_openapi = "k8s_openapi",
        schemars = "schemars"
    )
)]
#[serde(rename_all = "camelCase")]
pub struct CompositionSpec {
    /// The type of composite resource that this composition is compatible with.
    pub composite_type_ref: TypeReference,

    /// Named sets of patches that may be referenced from resource templates.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patch_sets: Vec<PatchSet>,

    /// The list of resource templates that will be used when a composite
    /// resource referring to this composition is created.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<ComposedTemplate>,

    /// Functions run after the resource templates were rendered.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub functions: Vec<Function>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_connection_secrets_to_namespace: Option<String>,
}

/// A reference to a type, e.g. `example.org/v1alpha1` `XDatabase`.
#[derive(Clone, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeReference {
    pub api_version: String,
    pub kind: String,
}

impl TypeReference {
    pub fn group_version_kind(&self) -> Result<GroupVersionKind, BaseObjectError> {
        parse_group_version_kind(&self.api_version, &self.kind)
    }
}

impl std::fmt::Display for TypeReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{api_version}, Kind={kind}", api_version = self.api_version, kind = self.kind)
    }
}

fn parse_group_version_kind(
    api_version: &str,
    kind: &str,
) -> Result<GroupVersionKind, BaseObjectError> {
    let group_version =
        GroupVersion::from_str(api_version).context(ParseApiVersionSnafu { api_version })?;
    Ok(group_version.with_kind(kind))
}

/// A named set of patches, referenced by `PatchSet` patches.
#[derive(Clone, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchSet {
    pub name: String,
    pub patches: Vec<Patch>,
}

/// A template for a single composed resource.
#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposedTemplate {
    /// Templates are either all named or all anonymous.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// The base object patches are applied to.
    #[schemars(schema_with = "raw_object_schema")]
    pub base: serde_json::Value,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patches: Vec<Patch>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub connection_details: Vec<ConnectionDetail>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub readiness_checks: Vec<ReadinessCheck>,
}

impl ComposedTemplate {
    /// Reads `apiVersion` and `kind` of the base object.
    pub fn base_group_version_kind(&self) -> Result<GroupVersionKind, BaseObjectError> {
        let base = self.base.as_object().context(NotAnObjectSnafu)?;
        let api_version = base
            .get("apiVersion")
            .and_then(serde_json::Value::as_str)
            .context(MissingFieldSnafu {
                field: "apiVersion",
            })?;
        let kind = base
            .get("kind")
            .and_then(serde_json::Value::as_str)
            .context(MissingFieldSnafu { field: "kind" })?;

        parse_group_version_kind(api_version, kind)
    }
}

#[derive(
    Clone, Copy, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize, strum::Display,
)]
pub enum ConnectionDetailType {
    FromConnectionSecretKey,
    FromFieldPath,
    FromValue,
}

/// A connection detail exposed by a composed resource.
#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionDetail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub detail_type: Option<ConnectionDetailType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_connection_secret_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_field_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize, strum::Display,
)]
pub enum ReadinessCheckType {
    #[default]
    NonEmpty,
    MatchString,
    MatchInteger,
    MatchCondition,
    None,
}

/// Determines whether a composed resource is ready.
#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessCheck {
    #[serde(rename = "type")]
    pub check_type: ReadinessCheckType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_string: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_integer: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_condition: Option<MatchConditionReadinessCheck>,
}

#[derive(Clone, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchConditionReadinessCheck {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, strum::Display, strum::EnumString)]
pub enum FunctionType {
    Container,
}

/// A function run after the resource templates were rendered.
#[derive(Clone, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Function {
    pub name: String,

    /// Kept as a string to report unknown types as validation errors.
    #[serde(rename = "type")]
    pub function_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<ContainerFunction>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "raw_object_schema")]
    pub config: Option<serde_json::Value>,
}

#[derive(Clone, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerFunction {
    pub image: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use kube::CustomResourceExt;

    use super::*;

    #[test]
    fn deserialize_composition() {
        let composition: Composition = serde_yaml::from_str(indoc! {"
            apiVersion: apiextensions.crossplane.io/v1
            kind: Composition
            metadata:
              name: databases
              annotations:
                crossplane.io/composition-validation-mode: strict
            spec:
              compositeTypeRef:
                apiVersion: example.org/v1alpha1
                kind: XDatabase
              patchSets:
                - name: common
                  patches:
                    - fromFieldPath: metadata.labels
              resources:
                - name: instance
                  base:
                    apiVersion: db.example.org/v1
                    kind: Instance
                    spec:
                      size: small
                  patches:
                    - type: PatchSet
                      patchSetName: common
                    - fromFieldPath: spec.region
                      toFieldPath: spec.forProvider.region
                      transforms:
                        - type: string
                          string:
                            type: Convert
                            convert: ToUpper
                  connectionDetails:
                    - fromFieldPath: status.endpoint
                  readinessChecks:
                    - type: MatchString
                      fieldPath: status.state
                      matchString: Online
        "})
        .expect("composition must deserialize");

        let spec = &composition.spec;
        assert_eq!(spec.patch_sets[0].patches[0].patch_type(), PatchType::FromCompositeFieldPath);

        let template = &spec.resources[0];
        assert_eq!(template.name.as_deref(), Some("instance"));
        assert_eq!(
            template.base_group_version_kind().expect("base must have a GVK"),
            GroupVersionKind::gvk("db.example.org", "v1", "Instance")
        );
        assert_eq!(template.patches[0].patch_type(), PatchType::PatchSet);
        assert_eq!(template.patches[1].transforms[0].transform_type, TransformType::String);
        assert_eq!(template.readiness_checks[0].check_type, ReadinessCheckType::MatchString);

        assert_eq!(
            spec.composite_type_ref
                .group_version_kind()
                .expect("composite type ref must parse"),
            GroupVersionKind::gvk("example.org", "v1alpha1", "XDatabase")
        );
    }

    #[test]
    fn base_without_kind() {
        let template = ComposedTemplate {
            base: serde_json::json!({"apiVersion": "v1"}),
            ..ComposedTemplate::default()
        };

        let err = template
            .base_group_version_kind()
            .expect_err("kind is missing");
        assert!(matches!(err, BaseObjectError::MissingField { field: "kind" }));
    }

    #[test]
    fn core_group_base() {
        let template = ComposedTemplate {
            base: serde_json::json!({"apiVersion": "v1", "kind": "ConfigMap"}),
            ..ComposedTemplate::default()
        };

        assert_eq!(
            template.base_group_version_kind().expect("base must have a GVK"),
            GroupVersionKind::gvk("", "v1", "ConfigMap")
        );
    }

    #[test]
    fn crd_generation() {
        let crd = Composition::crd();
        assert_eq!(crd.spec.group, "apiextensions.crossplane.io");
        assert_eq!(crd.spec.names.kind, "Composition");
    }
}
