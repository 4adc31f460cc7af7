//! Validates whole Compositions by combining the structural checks with the
//! schema based checks of patches, connection details and readiness checks.
use std::collections::HashMap;

use kube::{ResourceExt, core::GroupVersionKind};
use tracing::{debug, instrument, warn};

use crate::{
    crd::{ComposedTemplate, Composition, Patch, PatchKind},
    error::{FieldError, FieldErrors, Path},
    logical::ValidationChain,
    lookup::SchemaLookup,
    mode::{VALIDATION_MODE_ANNOTATION, ValidationMode},
    patch::{patch_path, validate_patch},
    render::{Renderer, check_shape, composite_stub},
    schema::Schema,
    template::{validate_connection_details, validate_readiness_checks},
};

/// Validates [`Composition`]s against the schemas of the types they refer to.
///
/// ```
/// use composition_validation::{lookup::SchemaMap, validator::CompositionValidator};
///
/// let composition = serde_yaml::from_str(
///     "
/// apiVersion: apiextensions.crossplane.io/v1
/// kind: Composition
/// metadata:
///   name: empty
/// spec:
///   compositeTypeRef:
///     apiVersion: example.org/v1
///     kind: XEmpty
/// ",
/// )
/// .unwrap();
///
/// // Loose mode tolerates missing schemas.
/// let validator = CompositionValidator::default();
/// assert!(validator.validate(&composition, &SchemaMap::new()).is_ok());
/// ```
#[derive(Default)]
pub struct CompositionValidator {
    chain: ValidationChain,
    renderer: Option<Box<dyn Renderer + Send + Sync>>,
    mode: Option<ValidationMode>,
}

impl CompositionValidator {
    /// Replaces the structural checks run before any schema is consulted.
    pub fn with_chain(mut self, chain: ValidationChain) -> Self {
        self.chain = chain;
        self
    }

    /// Enables rendering composed resources and checking them against their
    /// schema.
    pub fn with_renderer(mut self, renderer: impl Renderer + Send + Sync + 'static) -> Self {
        self.renderer = Some(Box::new(renderer));
        self
    }

    /// Uses `mode` instead of the mode annotated on the Composition.
    pub fn with_mode(mut self, mode: ValidationMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Validates `composition`, returning all problems found.
    #[instrument(skip_all, fields(composition.name = %composition.name_any()))]
    pub fn validate(
        &self,
        composition: &Composition,
        schemas: &impl SchemaLookup,
    ) -> Result<(), FieldErrors> {
        let mode = match self.mode.map_or_else(|| ValidationMode::of(composition), Ok) {
            Ok(mode) => mode,
            Err(err) => {
                return FieldErrors::from(vec![FieldError::invalid(
                    Path::new("metadata")
                        .child("annotations")
                        .key(VALIDATION_MODE_ANNOTATION),
                    err.value(),
                    err.to_string(),
                )])
                .into_result();
            }
        };
        debug!(%mode, "validating composition");

        let errors = self.chain.validate(composition);
        if !errors.is_empty() {
            return errors.into_result();
        }

        let mut effective = Vec::with_capacity(composition.spec.resources.len());
        let mut errors = FieldErrors::new();
        for (index, template) in composition.spec.resources.iter().enumerate() {
            match effective_patches(composition, template, index) {
                Ok(patches) => effective.push(patches),
                Err(err) => errors.push(err),
            }
        }
        if !errors.is_empty() {
            return errors.into_result();
        }

        let context = Context::new(composition, schemas, mode, &mut errors);

        for (index, (template, patches)) in composition
            .spec
            .resources
            .iter()
            .zip(&effective)
            .enumerate()
        {
            validate_template(&context, template, index, patches, &mut errors);
        }

        if composition.spec.functions.is_empty() {
            if let Some(renderer) = &self.renderer {
                render_templates(&context, renderer.as_ref(), &mut errors);
            }
        } else {
            debug!("composition uses functions, skipping rendering");
        }

        errors.into_result()
    }
}

/// The schemas shared by all templates of a Composition.
struct Context<'a> {
    composition: &'a Composition,
    mode: ValidationMode,
    composite: Option<&'a Schema>,
    composed: HashMap<usize, &'a Schema>,
}

impl<'a> Context<'a> {
    fn new(
        composition: &'a Composition,
        schemas: &'a impl SchemaLookup,
        mode: ValidationMode,
        errors: &mut FieldErrors,
    ) -> Self {
        let type_ref_path = Path::new("spec").child("compositeTypeRef");
        let composite = match composition.spec.composite_type_ref.group_version_kind() {
            Ok(gvk) => lookup(schemas, &gvk, mode, errors, || {
                FieldError::internal(
                    type_ref_path.clone(),
                    format!(
                        "cannot find schema for composite resource {}",
                        composition.spec.composite_type_ref
                    ),
                )
            }),
            Err(err) => {
                errors.push(FieldError::invalid(
                    type_ref_path.clone(),
                    &composition.spec.composite_type_ref,
                    err.to_string(),
                ));
                None
            }
        };

        let mut composed = HashMap::new();
        for (index, template) in composition.spec.resources.iter().enumerate() {
            let template_path = Path::new("spec").child("resources").index(index);

            let schema = match template.base_group_version_kind() {
                Ok(gvk) => lookup(schemas, &gvk, mode, errors, || {
                    FieldError::internal(
                        template_path.clone(),
                        format!(
                            "cannot find schema for composed resource {}, Kind={}",
                            gvk.api_version(),
                            gvk.kind
                        ),
                    )
                }),
                Err(err) => {
                    errors.push(FieldError::invalid(
                        template_path.child("base"),
                        &template.base,
                        err.to_string(),
                    ));
                    None
                }
            };

            if let Some(schema) = schema {
                composed.insert(index, schema);
            }
        }

        Self {
            composition,
            mode,
            composite,
            composed,
        }
    }
}

/// Looks up the schema of `gvk`. A missing schema is an error in strict mode
/// and only logged otherwise.
fn lookup<'a>(
    schemas: &'a impl SchemaLookup,
    gvk: &GroupVersionKind,
    mode: ValidationMode,
    errors: &mut FieldErrors,
    missing: impl FnOnce() -> FieldError,
) -> Option<&'a Schema> {
    let schema = schemas.schema(gvk);
    if schema.is_none() {
        match mode {
            ValidationMode::Strict => errors.push(missing()),
            ValidationMode::Loose => warn!(
                gvk.group = %gvk.group,
                gvk.version = %gvk.version,
                gvk.kind = %gvk.kind,
                "schema not found, skipping dependent checks"
            ),
        }
    }
    schema
}

/// Returns the patches of `template` with all patch set references replaced
/// by the patches of the referenced set.
fn effective_patches<'a>(
    composition: &'a Composition,
    template: &'a ComposedTemplate,
    resource_index: usize,
) -> Result<Vec<&'a Patch>, FieldError> {
    let mut patches = Vec::with_capacity(template.patches.len());

    for (patch_index, patch) in template.patches.iter().enumerate() {
        let Ok(PatchKind::PatchSet { name }) = patch.kind() else {
            patches.push(patch);
            continue;
        };

        let patch_set = composition
            .spec
            .patch_sets
            .iter()
            .find(|patch_set| patch_set.name == name)
            .ok_or_else(|| {
                FieldError::invalid(
                    patch_path(resource_index, patch_index).child("patchSetName"),
                    name,
                    format!("cannot find patch set {name:?}"),
                )
            })?;
        patches.extend(&patch_set.patches);
    }

    Ok(patches)
}

fn validate_template(
    context: &Context<'_>,
    template: &ComposedTemplate,
    index: usize,
    patches: &[&Patch],
    errors: &mut FieldErrors,
) {
    let composed = context.composed.get(&index).copied();
    debug!(
        template.index = index,
        template.name = template.name.as_deref(),
        patches = patches.len(),
        "validating resource template"
    );

    for (patch_index, patch) in patches.iter().enumerate() {
        if let Err(err) = patch.kind() {
            errors.push(err.to_field_error(&patch_path(index, patch_index)));
            continue;
        }

        if let (Some(composite), Some(composed)) = (context.composite, composed) {
            errors.extend(validate_patch(patch, index, patch_index, composite, composed));
        }
    }

    if let Some(composed) = composed {
        errors.extend(validate_connection_details(template, index, composed));
    }
    errors.extend(validate_readiness_checks(template, index, composed));
}

fn render_templates(context: &Context<'_>, renderer: &dyn Renderer, errors: &mut FieldErrors) {
    let Some(composite_schema) = context.composite else {
        debug!(mode = %context.mode, "composite schema is unknown, skipping rendering");
        return;
    };
    let composite = composite_stub(context.composition, composite_schema);

    for (index, template) in context.composition.spec.resources.iter().enumerate() {
        let Some(composed_schema) = context.composed.get(&index) else {
            continue;
        };
        let base_path = Path::new("spec")
            .child("resources")
            .index(index)
            .child("base");

        let mut composed = serde_json::Value::Null;
        if let Err(err) = renderer.render(&composite, &mut composed, template, None) {
            errors.push(FieldError::internal(base_path, err.to_string()));
            continue;
        }

        errors.extend(
            check_shape(&composed, composed_schema)
                .into_iter()
                .map(|problem| FieldError::invalid(base_path.clone(), &template.base, problem)),
        );
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::{error::ErrorKind, lookup::SchemaMap, render::BaseRenderer};

    fn composition(yaml: &str) -> Composition {
        serde_yaml::from_str(yaml).expect("composition must deserialize")
    }

    fn fields(errors: &FieldErrors) -> Vec<String> {
        errors.iter().map(|error| error.field.to_string()).collect()
    }

    const SCHEMAS: &str = indoc! {"
        apiVersion: apiextensions.k8s.io/v1
        kind: CustomResourceDefinition
        metadata:
          name: composites.resources.test.com
        spec:
          group: resources.test.com
          names: {kind: Composite, plural: composites}
          scope: Cluster
          versions:
            - name: v1
              served: true
              storage: true
              schema:
                openAPIV3Schema:
                  type: object
                  required: [spec]
                  properties:
                    spec:
                      type: object
                      required: [someField]
                      properties:
                        someField: {type: string}
        ---
        apiVersion: apiextensions.k8s.io/v1
        kind: CustomResourceDefinition
        metadata:
          name: manageds.test.com
        spec:
          group: test.com
          names: {kind: Managed, plural: manageds}
          scope: Cluster
          versions:
            - name: v1
              served: true
              storage: true
              schema:
                openAPIV3Schema:
                  type: object
                  properties:
                    spec:
                      type: object
                      required: [someOtherField]
                      properties:
                        someOtherField: {type: string}
    "};

    fn schemas() -> SchemaMap {
        SchemaMap::from_yaml(SCHEMAS).expect("CRDs must be valid")
    }

    const PATCH_SET_COMPOSITION: &str = indoc! {"
        apiVersion: apiextensions.crossplane.io/v1
        kind: Composition
        metadata:
          name: test
        spec:
          compositeTypeRef:
            apiVersion: resources.test.com/v1
            kind: Composite
          patchSets:
            - name: common
              patches:
                - fromFieldPath: spec.doesNotExist
                  toFieldPath: spec.someOtherField
          resources:
            - name: managed
              base:
                apiVersion: test.com/v1
                kind: Managed
                spec:
                  someOtherField: hello
              patches:
                - fromFieldPath: spec.someField
                  toFieldPath: spec.someOtherField
                - type: PatchSet
                  patchSetName: common
    "};

    #[test]
    fn spliced_patch_sets_are_type_checked() {
        let errors = CompositionValidator::default()
            .validate(&composition(PATCH_SET_COMPOSITION), &schemas())
            .expect_err("patch set references an unknown field");
        assert_eq!(
            fields(&errors),
            ["spec.resources[0].patches[1].fromFieldPath"]
        );
    }

    #[test]
    fn unknown_patch_set() {
        let yaml = PATCH_SET_COMPOSITION.replace("patchSetName: common", "patchSetName: other");
        let errors = CompositionValidator::default()
            .validate(&composition(&yaml), &schemas())
            .expect_err("patch set doesn't exist");
        assert_eq!(
            fields(&errors),
            ["spec.resources[0].patches[1].patchSetName"]
        );
    }

    #[test]
    fn invalid_mode_annotation() {
        let yaml = PATCH_SET_COMPOSITION.replace(
            "  name: test\n",
            "  name: test\n  annotations:\n    crossplane.io/composition-validation-mode: paranoid\n",
        );
        let errors = CompositionValidator::default()
            .validate(&composition(&yaml), &schemas())
            .expect_err("paranoid is not a validation mode");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ErrorKind::Invalid);
    }

    #[test]
    fn mode_override() {
        let composition = composition(indoc! {"
            apiVersion: apiextensions.crossplane.io/v1
            kind: Composition
            metadata:
              name: test
            spec:
              compositeTypeRef:
                apiVersion: example.org/v1
                kind: XUnknown
        "});

        let loose = CompositionValidator::default();
        assert!(loose.validate(&composition, &schemas()).is_ok());

        let strict = CompositionValidator::default().with_mode(ValidationMode::Strict);
        let errors = strict
            .validate(&composition, &schemas())
            .expect_err("composite schema is missing");
        assert_eq!(fields(&errors), ["spec.compositeTypeRef"]);
        assert_eq!(errors[0].kind, ErrorKind::Internal);
    }

    #[test]
    fn invalid_base() {
        let composition = composition(indoc! {"
            apiVersion: apiextensions.crossplane.io/v1
            kind: Composition
            metadata:
              name: test
            spec:
              compositeTypeRef:
                apiVersion: resources.test.com/v1
                kind: Composite
              resources:
                - base:
                    apiVersion: test.com/v1
        "});

        let errors = CompositionValidator::default()
            .validate(&composition, &schemas())
            .expect_err("base has no kind");
        assert_eq!(fields(&errors), ["spec.resources[0].base"]);
    }

    #[test]
    fn rendering() {
        let composition = composition(indoc! {"
            apiVersion: apiextensions.crossplane.io/v1
            kind: Composition
            metadata:
              name: test
            spec:
              compositeTypeRef:
                apiVersion: resources.test.com/v1
                kind: Composite
              resources:
                - name: valid
                  base:
                    apiVersion: test.com/v1
                    kind: Managed
                    spec:
                      someOtherField: hello
                - name: invalid
                  base:
                    apiVersion: test.com/v1
                    kind: Managed
                    spec:
                      someOtherField: 42
        "});

        assert!(
            CompositionValidator::default()
                .validate(&composition, &schemas())
                .is_ok()
        );

        let errors = CompositionValidator::default()
            .with_renderer(BaseRenderer)
            .validate(&composition, &schemas())
            .expect_err("rendered base has a wrong type");
        assert_eq!(fields(&errors), ["spec.resources[1].base"]);
        assert_eq!(
            errors[0].detail,
            "spec.someOtherField: expected string, got integer"
        );
    }
}
