//! Type checks for a single patch against the composite and composed schemas.
use std::str::FromStr;

use tracing::debug;

use crate::{
    crd::{CombinePatch, CombineStrategy, FieldPathPatch, Patch, PatchKind},
    error::{FieldError, Path},
    resolver::resolve,
    schema::{KnownType, Schema},
    transform::validate_chain,
};

/// The path of the patch at `patch_index` of the template at
/// `resource_index`.
pub fn patch_path(resource_index: usize, patch_index: usize) -> Path {
    Path::new("spec")
        .child("resources")
        .index(resource_index)
        .child("patches")
        .index(patch_index)
}

/// Validates `patch` against the `composite` and `composed` schemas.
///
/// Patches that can't be checked statically, like environment patches, are
/// accepted as is. Patch set references must be resolved beforehand.
pub fn validate_patch(
    patch: &Patch,
    resource_index: usize,
    patch_index: usize,
    composite: &Schema,
    composed: &Schema,
) -> Vec<FieldError> {
    let path = patch_path(resource_index, patch_index);

    if !patch.patch_type().is_statically_validatable() {
        debug!(
            patch.path = %path,
            patch.kind = %patch.patch_type(),
            "patch type can't be validated statically, skipping"
        );
        return Vec::new();
    }

    let kind = match patch.kind() {
        Ok(kind) => kind,
        Err(err) => return vec![err.to_field_error(&path)],
    };

    match kind {
        PatchKind::FromCompositeFieldPath(field_paths) => {
            validate_field_path_patch(patch, field_paths, composite, composed, &path)
        }
        PatchKind::ToCompositeFieldPath(field_paths) => {
            validate_field_path_patch(patch, field_paths, composed, composite, &path)
        }
        PatchKind::CombineFromComposite(combine) => {
            validate_combine_patch(patch, combine, composite, composed, &path)
        }
        PatchKind::CombineToComposite(combine) => {
            validate_combine_patch(patch, combine, composed, composite, &path)
        }
        // Filtered out above
        PatchKind::FromEnvironmentFieldPath(_)
        | PatchKind::ToEnvironmentFieldPath(_)
        | PatchKind::CombineFromEnvironment(_)
        | PatchKind::CombineToEnvironment(_)
        | PatchKind::PatchSet { .. } => Vec::new(),
    }
}

fn validate_field_path_patch(
    patch: &Patch,
    field_paths: FieldPathPatch<'_>,
    from_schema: &Schema,
    to_schema: &Schema,
    path: &Path,
) -> Vec<FieldError> {
    let FieldPathPatch {
        from_field_path,
        to_field_path,
    } = field_paths;

    let from = match resolve(from_schema, from_field_path) {
        Ok(from) => from,
        Err(err) => {
            return vec![FieldError::invalid(
                path.child("fromFieldPath"),
                from_field_path,
                err.to_string(),
            )];
        }
    };
    let to = match resolve(to_schema, to_field_path) {
        Ok(to) => to,
        Err(err) => {
            return vec![FieldError::invalid(
                path.child("toFieldPath"),
                to_field_path,
                err.to_string(),
            )];
        }
    };

    if to.required && !(from.required || patch.requires_source()) {
        return vec![FieldError::invalid(
            path.child("fromFieldPath"),
            from_field_path,
            format!("from field path is not required but to field path is ({to_field_path})"),
        )];
    }

    validate_transforms(patch, from.field_type, to.field_type, path)
}

fn validate_combine_patch(
    patch: &Patch,
    combine_patch: CombinePatch<'_>,
    from_schema: &Schema,
    to_schema: &Schema,
    path: &Path,
) -> Vec<FieldError> {
    let CombinePatch {
        combine,
        to_field_path,
    } = combine_patch;
    let combine_path = path.child("combine");

    let mut errors = Vec::new();
    let mut from_required = true;
    for (index, variable) in combine.variables.iter().enumerate() {
        match resolve(from_schema, &variable.from_field_path) {
            Ok(from) => from_required &= from.required,
            Err(err) => errors.push(FieldError::invalid(
                combine_path.clone(),
                &combine.variables,
                format!(
                    "variable {index} ({from_field_path}): {err}",
                    from_field_path = variable.from_field_path
                ),
            )),
        }
    }

    let to = match resolve(to_schema, to_field_path) {
        Ok(to) => Some(to),
        Err(err) => {
            errors.push(FieldError::invalid(
                path.child("toFieldPath"),
                to_field_path,
                err.to_string(),
            ));
            None
        }
    };

    let Some(to) = to.filter(|_| errors.is_empty()) else {
        return errors;
    };

    if to.required && !(from_required || patch.requires_source()) {
        let variables = combine
            .variables
            .iter()
            .map(|variable| variable.from_field_path.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        return vec![FieldError::invalid(
            combine_path,
            &combine.variables,
            format!(
                "from field paths ({variables}) are not required but to field path is ({to_field_path})"
            ),
        )];
    }

    match CombineStrategy::from_str(&combine.strategy) {
        Ok(CombineStrategy::String) if combine.string.is_none() => {
            return vec![FieldError::required(
                combine_path.child("string"),
                "string combine strategy requires configuration",
            )];
        }
        Ok(CombineStrategy::String) => {}
        Err(_) => {
            return vec![FieldError::invalid(
                combine_path.child("strategy"),
                &combine.strategy,
                "combine strategy is not supported",
            )];
        }
    }

    // Formatting always produces a string
    validate_transforms(patch, Some(KnownType::String), to.field_type, path)
}

fn validate_transforms(
    patch: &Patch,
    from: Option<KnownType>,
    to: Option<KnownType>,
    path: &Path,
) -> Vec<FieldError> {
    match validate_chain(&patch.transforms, from, to) {
        Ok(()) => Vec::new(),
        Err(err) => vec![err.to_field_error(path, &patch.transforms)],
    }
}
