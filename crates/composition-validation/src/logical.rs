//! Structural checks of a Composition which don't need any schema.
//!
//! The checks are collected in a [`ValidationChain`]. All checks run, even if
//! previous ones failed, and their errors are concatenated.
use std::{collections::HashSet, str::FromStr};

use crate::{
    crd::{Composition, FunctionType, PatchType},
    error::{FieldError, FieldErrors, Path},
};

const ERR_MIXED: &str =
    "cannot mix named and anonymous resource templates - ensure all resource templates are named";
const ERR_DUPLICATE: &str = "resource template names must be unique within their Composition";
const ERR_FNS_REQUIRE_NAMES: &str =
    "cannot use functions with anonymous resource templates - ensure all resource templates are named";
const ERR_FN_MISSING_CONTAINER_CONFIG: &str =
    "functions of type: Container must specify container configuration";
const ERR_DUPLICATE_PATCH_SET: &str = "patch set names must be unique within their Composition";
const ERR_NESTED_PATCH_SET: &str = "cannot nest patch sets";

/// A single structural check.
///
/// Implemented for all functions and closures with a matching signature.
pub trait CompositionCheck: Send + Sync {
    fn check(&self, composition: &Composition) -> Vec<FieldError>;
}

impl<F> CompositionCheck for F
where
    F: Fn(&Composition) -> Vec<FieldError> + Send + Sync,
{
    fn check(&self, composition: &Composition) -> Vec<FieldError> {
        self(composition)
    }
}

/// An ordered list of [`CompositionCheck`]s.
pub struct ValidationChain {
    checks: Vec<Box<dyn CompositionCheck>>,
}

impl Default for ValidationChain {
    /// The chain of all structural checks.
    fn default() -> Self {
        Self::empty()
            .with_check(reject_mixed_templates)
            .with_check(reject_duplicate_names)
            .with_check(reject_anonymous_templates_with_functions)
            .with_check(reject_functions_without_required_config)
            .with_check(reject_invalid_patch_sets)
    }
}

impl ValidationChain {
    pub fn empty() -> Self {
        Self { checks: Vec::new() }
    }

    /// Appends `check` to the end of the chain.
    pub fn with_check(mut self, check: impl CompositionCheck + 'static) -> Self {
        self.checks.push(Box::new(check));
        self
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Runs all checks and returns their errors.
    pub fn validate(&self, composition: &Composition) -> FieldErrors {
        self.checks
            .iter()
            .flat_map(|check| check.check(composition))
            .collect()
    }
}

fn resources_path() -> Path {
    Path::new("spec").child("resources")
}

/// Resource templates must either all be named or all be anonymous.
pub fn reject_mixed_templates(composition: &Composition) -> Vec<FieldError> {
    let resources = &composition.spec.resources;
    let named = resources
        .iter()
        .filter(|template| template.name.is_some())
        .count();

    if named == 0 || named == resources.len() {
        return Vec::new();
    }

    let names: Vec<Option<&str>> = resources
        .iter()
        .map(|template| template.name.as_deref())
        .collect();
    vec![FieldError::invalid(resources_path(), names, ERR_MIXED)]
}

/// Resource template names must be unique. Every repeated occurrence is
/// reported, the first one isn't.
pub fn reject_duplicate_names(composition: &Composition) -> Vec<FieldError> {
    let mut seen = HashSet::new();

    composition
        .spec
        .resources
        .iter()
        .enumerate()
        .filter_map(|(index, template)| {
            let name = template.name.as_deref()?;
            (!seen.insert(name)).then(|| {
                FieldError::duplicate(
                    resources_path().index(index).child("name"),
                    name,
                    ERR_DUPLICATE,
                )
            })
        })
        .collect()
}

/// Functions refer to the output of templates by name.
pub fn reject_anonymous_templates_with_functions(composition: &Composition) -> Vec<FieldError> {
    if composition.spec.functions.is_empty() {
        return Vec::new();
    }

    composition
        .spec
        .resources
        .iter()
        .enumerate()
        .filter(|(_, template)| template.name.is_none())
        .map(|(index, _)| {
            FieldError::invalid(
                resources_path().index(index).child("name"),
                serde_json::Value::Null,
                ERR_FNS_REQUIRE_NAMES,
            )
        })
        .collect()
}

/// Every function must carry the configuration of its type.
pub fn reject_functions_without_required_config(composition: &Composition) -> Vec<FieldError> {
    let mut errors = Vec::new();

    for (index, function) in composition.spec.functions.iter().enumerate() {
        let path = Path::new("spec").child("functions").index(index);

        match FunctionType::from_str(&function.function_type) {
            Ok(FunctionType::Container) if function.container.is_none() => errors.push(
                FieldError::required(path.child("container"), ERR_FN_MISSING_CONTAINER_CONFIG),
            ),
            Ok(FunctionType::Container) => {}
            Err(_) => errors.push(FieldError::invalid(
                path.child("type"),
                &function.function_type,
                format!("unknown function type {:?}", function.function_type),
            )),
        }
    }

    errors
}

/// Patch set names must be unique, patch sets must not reference other patch
/// sets and every patch must carry the fields its type requires.
pub fn reject_invalid_patch_sets(composition: &Composition) -> Vec<FieldError> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for (set_index, patch_set) in composition.spec.patch_sets.iter().enumerate() {
        let set_path = Path::new("spec").child("patchSets").index(set_index);

        if !seen.insert(patch_set.name.as_str()) {
            errors.push(FieldError::duplicate(
                set_path.child("name"),
                &patch_set.name,
                ERR_DUPLICATE_PATCH_SET,
            ));
        }

        for (patch_index, patch) in patch_set.patches.iter().enumerate() {
            let patch_path = set_path.child("patches").index(patch_index);

            if patch.patch_type() == PatchType::PatchSet {
                errors.push(FieldError::invalid(
                    patch_path.child("type"),
                    PatchType::PatchSet.to_string(),
                    ERR_NESTED_PATCH_SET,
                ));
                continue;
            }

            if let Err(err) = patch.kind() {
                errors.push(err.to_field_error(&patch_path));
            }
        }
    }

    errors
}
