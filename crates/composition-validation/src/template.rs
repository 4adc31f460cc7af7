//! Checks of the connection details and readiness checks of a template,
//! partly against the schema of the composed resource.
use crate::{
    crd::{ComposedTemplate, ReadinessCheck, ReadinessCheckType},
    error::{FieldError, Path},
    resolver::resolve,
    schema::{KnownType, Schema},
};

fn template_path(resource_index: usize) -> Path {
    Path::new("spec").child("resources").index(resource_index)
}

/// Every `fromFieldPath` of a connection detail must exist in the composed
/// resource. Other connection detail sources can't be checked statically.
pub fn validate_connection_details(
    template: &ComposedTemplate,
    resource_index: usize,
    composed: &Schema,
) -> Vec<FieldError> {
    let path = template_path(resource_index).child("connectionDetails");

    template
        .connection_details
        .iter()
        .enumerate()
        .filter_map(|(index, detail)| {
            let from_field_path = detail.from_field_path.as_deref()?;
            let err = resolve(composed, from_field_path).err()?;
            Some(FieldError::invalid(
                path.index(index).child("fromFieldPath"),
                from_field_path,
                err.to_string(),
            ))
        })
        .collect()
}

/// Validates the readiness checks of `template`. Each check must carry the
/// fields its type needs. With a `composed` schema, its field path must also
/// resolve to a field of the type the check compares against.
pub fn validate_readiness_checks(
    template: &ComposedTemplate,
    resource_index: usize,
    composed: Option<&Schema>,
) -> Vec<FieldError> {
    let path = template_path(resource_index).child("readinessChecks");

    template
        .readiness_checks
        .iter()
        .enumerate()
        .filter_map(|(index, check)| validate_readiness_check(check, &path.index(index), composed))
        .collect()
}

fn validate_readiness_check(
    check: &ReadinessCheck,
    path: &Path,
    composed: Option<&Schema>,
) -> Option<FieldError> {
    let expected_type = match check.check_type {
        ReadinessCheckType::None => return None,
        ReadinessCheckType::MatchCondition => {
            return match &check.match_condition {
                Some(condition) if condition.condition_type.is_empty() => Some(
                    FieldError::required(path.child("matchCondition").child("type"), "must not be empty"),
                ),
                Some(condition) if condition.status.is_empty() => Some(FieldError::required(
                    path.child("matchCondition").child("status"),
                    "must not be empty",
                )),
                Some(_) => None,
                None => Some(FieldError::required(
                    path.child("matchCondition"),
                    "matchCondition is required for readiness checks of type MatchCondition",
                )),
            };
        }
        ReadinessCheckType::NonEmpty => None,
        ReadinessCheckType::MatchString => {
            if check.match_string.as_deref().is_none_or(str::is_empty) {
                return Some(FieldError::required(
                    path.child("matchString"),
                    "matchString is required for readiness checks of type MatchString",
                ));
            }
            Some(KnownType::String)
        }
        ReadinessCheckType::MatchInteger => {
            if check.match_integer.is_none() {
                return Some(FieldError::required(
                    path.child("matchInteger"),
                    "matchInteger is required for readiness checks of type MatchInteger",
                ));
            }
            Some(KnownType::Integer)
        }
    };

    let field_path_path = path.child("fieldPath");
    let Some(field_path) = check.field_path.as_deref().filter(|path| !path.is_empty()) else {
        return Some(FieldError::required(
            field_path_path,
            format!(
                "fieldPath is required for readiness checks of type {}",
                check.check_type
            ),
        ));
    };

    let composed = composed?;
    let resolved = match resolve(composed, field_path) {
        Ok(resolved) => resolved,
        Err(err) => return Some(FieldError::invalid(field_path_path, field_path, err.to_string())),
    };

    // Fields of unknown type can't be checked.
    match (expected_type, resolved.field_type) {
        (Some(expected), Some(actual)) if expected != actual => Some(FieldError::invalid(
            field_path_path,
            field_path,
            format!("expected field path to be of type {expected}"),
        )),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::LazyLock;

    use indoc::indoc;
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::JSONSchemaProps;
    use rstest::rstest;

    use super::*;
    use crate::error::ErrorKind;

    static COMPOSED: LazyLock<Schema> = LazyLock::new(|| {
        let props: JSONSchemaProps = serde_yaml::from_str(indoc! {"
            type: object
            properties:
              spec:
                type: object
                properties:
                  someOtherField:
                    type: string
                  replicas:
                    type: integer
              status:
                type: object
                x-kubernetes-preserve-unknown-fields: true
        "})
        .expect("schema must deserialize");
        Schema::try_from(&props).expect("schema must be valid")
    });

    fn template(yaml: &str) -> ComposedTemplate {
        serde_yaml::from_str(yaml).expect("template must deserialize")
    }

    #[test]
    fn connection_details() {
        let template = template(indoc! {"
            base: {apiVersion: test.com/v1, kind: Managed}
            connectionDetails:
              - name: field
                fromFieldPath: spec.someOtherField
              - name: missing
                fromFieldPath: spec.doesNotExist
              - name: value
                type: FromValue
                value: hello
        "});

        let errors = validate_connection_details(&template, 1, &COMPOSED);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ErrorKind::Invalid);
        assert_eq!(
            errors[0].field.to_string(),
            "spec.resources[1].connectionDetails[1].fromFieldPath"
        );
    }

    #[rstest]
    #[case::non_empty("{type: NonEmpty, fieldPath: spec.someOtherField}", None)]
    #[case::match_string("{type: MatchString, fieldPath: spec.someOtherField, matchString: ready}", None)]
    #[case::match_integer("{type: MatchInteger, fieldPath: spec.replicas, matchInteger: 3}", None)]
    #[case::unknown_type_is_accepted("{type: MatchInteger, fieldPath: status.replicas, matchInteger: 3}", None)]
    #[case::none("{type: None}", None)]
    #[case::condition("{type: MatchCondition, matchCondition: {type: Ready, status: 'True'}}", None)]
    #[case::string_mismatch(
        "{type: MatchString, fieldPath: spec.replicas, matchString: ready}",
        Some("spec.resources[0].readinessChecks[0].fieldPath")
    )]
    #[case::integer_mismatch(
        "{type: MatchInteger, fieldPath: spec.someOtherField, matchInteger: 1}",
        Some("spec.resources[0].readinessChecks[0].fieldPath")
    )]
    #[case::unresolvable(
        "{type: NonEmpty, fieldPath: spec.nope}",
        Some("spec.resources[0].readinessChecks[0].fieldPath")
    )]
    #[case::missing_field_path(
        "{type: NonEmpty}",
        Some("spec.resources[0].readinessChecks[0].fieldPath")
    )]
    #[case::missing_match_string(
        "{type: MatchString, fieldPath: spec.someOtherField}",
        Some("spec.resources[0].readinessChecks[0].matchString")
    )]
    #[case::missing_condition(
        "{type: MatchCondition}",
        Some("spec.resources[0].readinessChecks[0].matchCondition")
    )]
    fn readiness_checks(#[case] check: &str, #[case] expected: Option<&str>) {
        let template = template(&format!(
            "{{base: {{apiVersion: test.com/v1, kind: Managed}}, readinessChecks: [{check}]}}"
        ));

        let errors = validate_readiness_checks(&template, 0, Some(&COMPOSED));
        let fields: Vec<String> = errors.iter().map(|error| error.field.to_string()).collect();
        assert_eq!(fields, expected.into_iter().collect::<Vec<_>>());
    }

    #[rstest]
    #[case::complete("{type: MatchString, fieldPath: spec.nope, matchString: ready}", None)]
    #[case::missing_match_string(
        "{type: MatchString}",
        Some("spec.resources[0].readinessChecks[0].matchString")
    )]
    #[case::missing_field_path(
        "{type: MatchInteger, matchInteger: 1}",
        Some("spec.resources[0].readinessChecks[0].fieldPath")
    )]
    fn readiness_checks_without_schema(#[case] check: &str, #[case] expected: Option<&str>) {
        let template = template(&format!(
            "{{base: {{apiVersion: test.com/v1, kind: Managed}}, readinessChecks: [{check}]}}"
        ));

        let errors = validate_readiness_checks(&template, 0, None);
        let fields: Vec<String> = errors.iter().map(|error| error.field.to_string()).collect();
        assert_eq!(fields, expected.into_iter().collect::<Vec<_>>());
    }

    #[test]
    fn type_mismatch_detail() {
        let template = template(indoc! {"
            base: {apiVersion: test.com/v1, kind: Managed}
            readinessChecks:
              - type: MatchString
                fieldPath: spec.replicas
                matchString: ready
        "});

        let errors = validate_readiness_checks(&template, 0, Some(&COMPOSED));
        assert_eq!(errors[0].detail, "expected field path to be of type string");
    }
}
