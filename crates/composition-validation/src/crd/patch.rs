use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use snafu::{OptionExt, Snafu, ensure};

use crate::{
    crd::Transform,
    error::{FieldError, Path},
};

/// Errors caused by patches which lack the fields their type requires.
#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum PatchShapeError {
    #[snafu(display("fromFieldPath is required by type {patch_type}"))]
    MissingFromFieldPath { patch_type: PatchType },

    #[snafu(display("toFieldPath is required by type {patch_type}"))]
    MissingToFieldPath { patch_type: PatchType },

    #[snafu(display("combine is required by type {patch_type}"))]
    MissingCombine { patch_type: PatchType },

    #[snafu(display("combine requires at least one variable"))]
    MissingCombineVariables,

    #[snafu(display("patchSetName is required by type PatchSet"))]
    MissingPatchSetName,
}

impl PatchShapeError {
    /// The field which is missing, relative to the patch.
    pub fn field(&self) -> Path {
        match self {
            Self::MissingFromFieldPath { .. } => Path::new("fromFieldPath"),
            Self::MissingToFieldPath { .. } => Path::new("toFieldPath"),
            Self::MissingCombine { .. } => Path::new("combine"),
            Self::MissingCombineVariables => Path::new("combine").child("variables"),
            Self::MissingPatchSetName => Path::new("patchSetName"),
        }
    }

    /// Converts this error into a [`FieldError`] below the patch at `patch`.
    pub fn to_field_error(&self, patch: &Path) -> FieldError {
        FieldError::required(patch.join(&self.field()), self.to_string())
    }
}

/// All patch types known to the API.
///
/// Only a subset can be checked statically, see
/// [`PatchType::is_statically_validatable`].
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    Eq,
    Hash,
    JsonSchema,
    PartialEq,
    Serialize,
    strum::Display,
)]
pub enum PatchType {
    #[default]
    FromCompositeFieldPath,
    ToCompositeFieldPath,
    CombineFromComposite,
    CombineToComposite,
    FromEnvironmentFieldPath,
    ToEnvironmentFieldPath,
    CombineFromEnvironment,
    CombineToEnvironment,
    PatchSet,
}

impl PatchType {
    /// Whether patches of this type are type-checked against the composite
    /// and composed schemas. The environment has no schema and patch set
    /// references are resolved before checking, so those are accepted as is.
    pub fn is_statically_validatable(self) -> bool {
        matches!(
            self,
            Self::FromCompositeFieldPath
                | Self::ToCompositeFieldPath
                | Self::CombineFromComposite
                | Self::CombineToComposite
        )
    }
}

/// A patch between the composite resource (or the environment) and a
/// composed resource.
#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Patch {
    /// Defaults to `FromCompositeFieldPath`.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub patch_type: Option<PatchType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_field_path: Option<String>,

    /// Defaults to `fromFieldPath` for field path patches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_field_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub combine: Option<Combine>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch_set_name: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transforms: Vec<Transform>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<PatchPolicy>,
}

/// The typed view of a [`Patch`], only containing the fields relevant for
/// its type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatchKind<'a> {
    FromCompositeFieldPath(FieldPathPatch<'a>),
    ToCompositeFieldPath(FieldPathPatch<'a>),
    CombineFromComposite(CombinePatch<'a>),
    CombineToComposite(CombinePatch<'a>),
    FromEnvironmentFieldPath(FieldPathPatch<'a>),
    ToEnvironmentFieldPath(FieldPathPatch<'a>),
    CombineFromEnvironment(CombinePatch<'a>),
    CombineToEnvironment(CombinePatch<'a>),
    PatchSet { name: &'a str },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldPathPatch<'a> {
    pub from_field_path: &'a str,
    pub to_field_path: &'a str,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CombinePatch<'a> {
    pub combine: &'a Combine,
    pub to_field_path: &'a str,
}

impl Patch {
    pub fn patch_type(&self) -> PatchType {
        self.patch_type.unwrap_or_default()
    }

    /// Whether the source field is required by the patch policy, in which
    /// case the patch fails instead of leaving the destination unset.
    pub fn requires_source(&self) -> bool {
        self.policy
            .as_ref()
            .and_then(|policy| policy.from_field_path)
            .is_some_and(|policy| policy == FromFieldPathPolicy::Required)
    }

    /// Checks that all fields required by the patch type are present and
    /// returns the typed view of this patch.
    pub fn kind(&self) -> Result<PatchKind<'_>, PatchShapeError> {
        let patch_type = self.patch_type();

        Ok(match patch_type {
            PatchType::FromCompositeFieldPath => {
                PatchKind::FromCompositeFieldPath(self.field_path_patch(patch_type)?)
            }
            PatchType::ToCompositeFieldPath => {
                PatchKind::ToCompositeFieldPath(self.field_path_patch(patch_type)?)
            }
            PatchType::FromEnvironmentFieldPath => {
                PatchKind::FromEnvironmentFieldPath(self.field_path_patch(patch_type)?)
            }
            PatchType::ToEnvironmentFieldPath => {
                PatchKind::ToEnvironmentFieldPath(self.field_path_patch(patch_type)?)
            }
            PatchType::CombineFromComposite => {
                PatchKind::CombineFromComposite(self.combine_patch(patch_type)?)
            }
            PatchType::CombineToComposite => {
                PatchKind::CombineToComposite(self.combine_patch(patch_type)?)
            }
            PatchType::CombineFromEnvironment => {
                PatchKind::CombineFromEnvironment(self.combine_patch(patch_type)?)
            }
            PatchType::CombineToEnvironment => {
                PatchKind::CombineToEnvironment(self.combine_patch(patch_type)?)
            }
            PatchType::PatchSet => PatchKind::PatchSet {
                name: non_empty(self.patch_set_name.as_deref()).context(MissingPatchSetNameSnafu)?,
            },
        })
    }

    fn field_path_patch(&self, patch_type: PatchType) -> Result<FieldPathPatch<'_>, PatchShapeError> {
        let from_field_path = non_empty(self.from_field_path.as_deref())
            .context(MissingFromFieldPathSnafu { patch_type })?;

        Ok(FieldPathPatch {
            from_field_path,
            to_field_path: non_empty(self.to_field_path.as_deref()).unwrap_or(from_field_path),
        })
    }

    fn combine_patch(&self, patch_type: PatchType) -> Result<CombinePatch<'_>, PatchShapeError> {
        let combine = self
            .combine
            .as_ref()
            .context(MissingCombineSnafu { patch_type })?;
        ensure!(!combine.variables.is_empty(), MissingCombineVariablesSnafu);

        let to_field_path = non_empty(self.to_field_path.as_deref())
            .context(MissingToFieldPathSnafu { patch_type })?;

        Ok(CombinePatch {
            combine,
            to_field_path,
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.is_empty())
}

/// Combines multiple source fields into a single destination field.
#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Combine {
    pub variables: Vec<CombineVariable>,

    /// Kept as a string to report unsupported strategies as validation
    /// errors, see [`CombineStrategy`].
    pub strategy: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string: Option<StringCombine>,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CombineVariable {
    pub from_field_path: String,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StringCombine {
    pub fmt: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum CombineStrategy {
    String,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_field_path: Option<FromFieldPathPolicy>,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
pub enum FromFieldPathPolicy {
    Optional,
    Required,
}
