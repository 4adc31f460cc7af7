use composition_validation::{
    crd::Composition,
    error::{ErrorKind, FieldErrors},
    lookup::SchemaMap,
    mode::ValidationMode,
    render::BaseRenderer,
    validator::CompositionValidator,
};
use indoc::{formatdoc, indoc};
use rstest::rstest;

const CRDS: &str = include_str!("fixtures/crds.yaml");

fn schemas() -> SchemaMap {
    SchemaMap::from_yaml(CRDS).expect("fixture CRDs must be valid")
}

fn composition(yaml: &str) -> Composition {
    serde_yaml::from_str(yaml).expect("composition must deserialize")
}

fn composition_with_patches(patches: &str) -> Composition {
    composition(&formatdoc! {"
        apiVersion: apiextensions.crossplane.io/v1
        kind: Composition
        metadata:
          name: test
        spec:
          compositeTypeRef:
            apiVersion: resources.test.com/v1
            kind: Composite
          resources:
            - name: managed
              base:
                apiVersion: test.com/v1
                kind: Managed
                spec:
                  someOtherField: hello
              patches: {patches}
    "})
}

fn fields(errors: &FieldErrors) -> Vec<String> {
    errors.iter().map(|error| error.field.to_string()).collect()
}

fn validate(composition: &Composition) -> Vec<String> {
    match CompositionValidator::default().validate(composition, &schemas()) {
        Ok(()) => Vec::new(),
        Err(errors) => fields(&errors),
    }
}

#[rstest]
#[case::string_to_string("[{fromFieldPath: spec.someField, toFieldPath: spec.someOtherField}]")]
#[case::optional_to_optional("[{fromFieldPath: spec.someNonRequiredField, toFieldPath: spec.someOptionalField}]")]
#[case::integer_to_number("[{fromFieldPath: spec.someIntegerField, toFieldPath: spec.someNumberField}]")]
#[case::required_policy(
    "[{fromFieldPath: spec.someNonRequiredField, toFieldPath: spec.someOtherField, policy: {fromFieldPath: Required}}]"
)]
#[case::convert_integer_to_string(
    "[{fromFieldPath: spec.someIntegerField, toFieldPath: spec.someOptionalField, transforms: [{type: convert, convert: {toType: string}}]}]"
)]
#[case::math_on_integer(
    "[{fromFieldPath: spec.someIntegerField, toFieldPath: spec.someNumberField, transforms: [{type: math, math: {multiply: 2}}]}]"
)]
#[case::list_item("[{fromFieldPath: 'spec.someListField[0]', toFieldPath: spec.someOptionalField}]")]
#[case::to_composite("[{type: ToCompositeFieldPath, fromFieldPath: status.phase, toFieldPath: spec.someNonRequiredField}]")]
#[case::metadata(
    "[{fromFieldPath: 'metadata.labels[app.kubernetes.io/name]', toFieldPath: 'metadata.annotations[example.org/name]'}]"
)]
#[case::combine(
    "[{type: CombineFromComposite, combine: {variables: [{fromFieldPath: spec.someField}], strategy: string, string: {fmt: 'name-%s'}}, toFieldPath: spec.someOtherField}]"
)]
#[case::environment("[{type: FromEnvironmentFieldPath, fromFieldPath: anything.at.all, toFieldPath: spec.someOtherField}]")]
fn valid_patches(#[case] patches: &str) {
    assert_eq!(validate(&composition_with_patches(patches)), Vec::<String>::new());
}

#[rstest]
#[case::unknown_from_field(
    "[{fromFieldPath: spec.doesNotExist, toFieldPath: spec.someOtherField}]",
    ErrorKind::Invalid,
    "spec.resources[0].patches[0].fromFieldPath"
)]
#[case::unknown_to_field(
    "[{fromFieldPath: spec.someField, toFieldPath: spec.doesNotExist}]",
    ErrorKind::Invalid,
    "spec.resources[0].patches[0].toFieldPath"
)]
#[case::optional_to_required(
    "[{fromFieldPath: spec.someNonRequiredField, toFieldPath: spec.someOtherField}]",
    ErrorKind::Invalid,
    "spec.resources[0].patches[0].fromFieldPath"
)]
#[case::integer_to_string(
    "[{fromFieldPath: spec.someIntegerField, toFieldPath: spec.someOptionalField}]",
    ErrorKind::Required,
    "spec.resources[0].patches[0].transforms"
)]
#[case::math_on_string(
    "[{fromFieldPath: spec.someField, toFieldPath: spec.someOtherField, transforms: [{type: math, math: {multiply: 2}}]}]",
    ErrorKind::Invalid,
    "spec.resources[0].patches[0].transforms[0]"
)]
#[case::convert_to_int64_into_string(
    "[{fromFieldPath: spec.someField, toFieldPath: spec.someOtherField, transforms: [{type: convert, convert: {toType: int64}}]}]",
    ErrorKind::Invalid,
    "spec.resources[0].patches[0].transforms"
)]
#[case::combine_optional_to_required(
    "[{type: CombineFromComposite, combine: {variables: [{fromFieldPath: spec.someNonRequiredField}], strategy: string, string: {fmt: '%s'}}, toFieldPath: spec.someOtherField}]",
    ErrorKind::Invalid,
    "spec.resources[0].patches[0].combine"
)]
#[case::combine_unknown_field(
    "[{type: CombineFromComposite, combine: {variables: [{fromFieldPath: spec.doesNotExist}], strategy: string, string: {fmt: '%s'}}, toFieldPath: spec.someOtherField}]",
    ErrorKind::Invalid,
    "spec.resources[0].patches[0].combine"
)]
#[case::missing_from_field_path(
    "[{type: FromCompositeFieldPath, toFieldPath: spec.someOtherField}]",
    ErrorKind::Required,
    "spec.resources[0].patches[0].fromFieldPath"
)]
fn invalid_patches(#[case] patches: &str, #[case] kind: ErrorKind, #[case] field: &str) {
    let errors = CompositionValidator::default()
        .validate(&composition_with_patches(patches), &schemas())
        .expect_err("patch must be rejected");

    assert_eq!(errors.len(), 1, "unexpected errors: {errors}");
    assert_eq!(errors[0].kind, kind);
    assert_eq!(errors[0].field.to_string(), field);
}

#[test]
fn all_patch_errors_are_reported() {
    let composition = composition_with_patches(
        "[{fromFieldPath: spec.doesNotExist, toFieldPath: spec.someOtherField}, {fromFieldPath: spec.someField, toFieldPath: spec.doesNotExist}]",
    );

    assert_eq!(
        validate(&composition),
        [
            "spec.resources[0].patches[0].fromFieldPath",
            "spec.resources[0].patches[1].toFieldPath",
        ]
    );
}

const NO_PATCHES: &str = indoc! {"
    apiVersion: apiextensions.crossplane.io/v1
    kind: Composition
    metadata:
      name: test
    spec:
      compositeTypeRef:
        apiVersion: resources.test.com/v1
        kind: Composite
      resources:
        - name: unknown
          base:
            apiVersion: unknown.test.com/v1
            kind: Unknown
"};

#[test]
fn loose_mode_tolerates_missing_schemas() {
    let validator = CompositionValidator::default();

    assert!(validator.validate(&composition(NO_PATCHES), &schemas()).is_ok());
    assert!(
        validator
            .validate(&composition(NO_PATCHES), &SchemaMap::new())
            .is_ok()
    );
}

#[test]
fn readiness_checks_need_their_fields_without_schemas() {
    let yaml = formatdoc! {"
        {NO_PATCHES}
              readinessChecks:
                - type: MatchString
    "};

    let errors = CompositionValidator::default()
        .validate(&composition(&yaml), &SchemaMap::new())
        .expect_err("matchString is missing");

    assert_eq!(
        fields(&errors),
        ["spec.resources[0].readinessChecks[0].matchString"]
    );
    assert_eq!(errors[0].kind, ErrorKind::Required);
}

#[test]
fn strict_mode_requires_composed_schemas() {
    let errors = CompositionValidator::default()
        .with_mode(ValidationMode::Strict)
        .validate(&composition(NO_PATCHES), &schemas())
        .expect_err("composed schema is missing");

    assert_eq!(fields(&errors), ["spec.resources[0]"]);
    assert_eq!(errors[0].kind, ErrorKind::Internal);
}

#[test]
fn strict_mode_requires_composite_schema() {
    let yaml = NO_PATCHES.replace(
        "  name: test\n",
        "  name: test\n  annotations:\n    crossplane.io/composition-validation-mode: strict\n",
    );

    let errors = CompositionValidator::default()
        .validate(&composition(&yaml), &SchemaMap::new())
        .expect_err("no schemas are known");

    assert_eq!(
        fields(&errors),
        ["spec.compositeTypeRef", "spec.resources[0]"]
    );
    assert!(errors.iter().all(|error| error.kind == ErrorKind::Internal));
}

#[test]
fn logical_errors_stop_validation() {
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
            - name: managed
              base: {apiVersion: test.com/v1, kind: Managed}
              patches:
                - fromFieldPath: spec.doesNotExist
            - name: managed
              base: {apiVersion: test.com/v1, kind: Managed}
    "});

    let errors = CompositionValidator::default()
        .validate(&composition, &schemas())
        .expect_err("names are not unique");

    assert_eq!(fields(&errors), ["spec.resources[1].name"]);
    assert_eq!(errors[0].kind, ErrorKind::Duplicate);
    assert_eq!(
        errors.to_string(),
        r#"spec.resources[1].name: Duplicate value: "managed": resource template names must be unique within their Composition"#
    );
}

const KNOWN_GOOD: &str = indoc! {"
    apiVersion: apiextensions.crossplane.io/v1
    kind: Composition
    metadata:
      name: known-good
      annotations:
        crossplane.io/composition-validation-mode: strict
    spec:
      compositeTypeRef:
        apiVersion: resources.test.com/v1
        kind: Composite
      patchSets:
        - name: labels
          patches:
            - fromFieldPath: metadata.labels
              toFieldPath: metadata.labels
      resources:
        - name: managed
          base:
            apiVersion: test.com/v1
            kind: Managed
            spec:
              someOtherField: hello
          patches:
            - type: PatchSet
              patchSetName: labels
            - fromFieldPath: spec.someField
              toFieldPath: spec.someOtherField
              transforms:
                - type: string
                  string:
                    type: Format
                    fmt: prefix-%s
            - type: ToCompositeFieldPath
              fromFieldPath: status.replicas
              toFieldPath: spec.someIntegerField
            - type: CombineFromComposite
              combine:
                variables:
                  - fromFieldPath: spec.someField
                  - fromFieldPath: metadata.name
                strategy: string
                string:
                  fmt: '%s-%s'
              toFieldPath: spec.someOptionalField
          connectionDetails:
            - name: phase
              fromFieldPath: status.phase
            - name: static
              type: FromValue
              value: hello
          readinessChecks:
            - type: MatchString
              fieldPath: status.phase
              matchString: Ready
            - type: MatchInteger
              fieldPath: status.replicas
              matchInteger: 1
"};

#[test]
fn known_good_composition() {
    let validator = CompositionValidator::default().with_renderer(BaseRenderer);
    let result = validator.validate(&composition(KNOWN_GOOD), &schemas());
    assert_eq!(result, Ok(()));
}

#[rstest]
#[case::connection_detail(
    "connectionDetails: [{name: nope, fromFieldPath: status.nope}]",
    "spec.resources[0].connectionDetails[0].fromFieldPath"
)]
#[case::readiness_check_type(
    "readinessChecks: [{type: MatchInteger, fieldPath: status.phase, matchInteger: 1}]",
    "spec.resources[0].readinessChecks[0].fieldPath"
)]
fn template_checks(#[case] extra: &str, #[case] field: &str) {
    let composition = composition(&formatdoc! {"
        apiVersion: apiextensions.crossplane.io/v1
        kind: Composition
        metadata:
          name: test
        spec:
          compositeTypeRef:
            apiVersion: resources.test.com/v1
            kind: Composite
          resources:
            - name: managed
              base: {{apiVersion: test.com/v1, kind: Managed}}
              {extra}
    "});

    assert_eq!(validate(&composition), [field]);
}

#[test]
fn functions_skip_rendering() {
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
            - name: managed
              base:
                apiVersion: test.com/v1
                kind: Managed
          functions:
            - name: fn
              type: Container
              container:
                image: example.org/fn:v1
    "});

    // The base lacks the required spec, which only rendering detects.
    let validator = CompositionValidator::default().with_renderer(BaseRenderer);
    assert!(validator.validate(&composition, &schemas()).is_ok());

    let mut without_functions = composition;
    without_functions.spec.functions.clear();
    let errors = validator
        .validate(&without_functions, &schemas())
        .expect_err("rendered base lacks a required field");
    assert_eq!(fields(&errors), ["spec.resources[0].base"]);
}
