use std::{collections::BTreeMap, str::FromStr};

use snafu::{ResultExt, Snafu};

use crate::crd::Composition;

/// The annotation used to select the [`ValidationMode`] of a Composition.
pub const VALIDATION_MODE_ANNOTATION: &str = "crossplane.io/composition-validation-mode";

#[derive(Debug, PartialEq, Eq, Snafu)]
#[snafu(display("invalid composition validation mode: {value}"))]
pub struct ModeError {
    source: strum::ParseError,
    value: String,
}

impl ModeError {
    pub fn value(&self) -> &str {
        &self.value
    }
}

/// Controls how missing schemas are treated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ValidationMode {
    /// Every referenced type must have a schema.
    Strict,

    /// Checks depending on a missing schema are skipped.
    #[default]
    Loose,
}

impl ValidationMode {
    /// Reads the mode from the [`VALIDATION_MODE_ANNOTATION`]. A missing or
    /// empty annotation selects the default.
    pub fn from_annotations(
        annotations: Option<&BTreeMap<String, String>>,
    ) -> Result<Self, ModeError> {
        match annotations
            .and_then(|annotations| annotations.get(VALIDATION_MODE_ANNOTATION))
            .filter(|value| !value.is_empty())
        {
            Some(value) => Self::from_str(value).context(ModeSnafu { value }),
            None => Ok(Self::default()),
        }
    }

    pub fn of(composition: &Composition) -> Result<Self, ModeError> {
        Self::from_annotations(composition.metadata.annotations.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn annotations(value: &str) -> BTreeMap<String, String> {
        BTreeMap::from([(VALIDATION_MODE_ANNOTATION.to_owned(), value.to_owned())])
    }

    #[rstest]
    #[case("strict", ValidationMode::Strict)]
    #[case("loose", ValidationMode::Loose)]
    #[case("", ValidationMode::Loose)]
    fn valid(#[case] value: &str, #[case] expected: ValidationMode) {
        assert_eq!(
            ValidationMode::from_annotations(Some(&annotations(value))),
            Ok(expected)
        );
    }

    #[test]
    fn default_without_annotation() {
        assert_eq!(ValidationMode::from_annotations(None), Ok(ValidationMode::Loose));
        assert_eq!(
            ValidationMode::from_annotations(Some(&BTreeMap::new())),
            Ok(ValidationMode::Loose)
        );
    }

    #[test]
    fn invalid() {
        let err = ValidationMode::from_annotations(Some(&annotations("paranoid")))
            .expect_err("paranoid is not a validation mode");
        assert_eq!(err.to_string(), "invalid composition validation mode: paranoid");
        assert_eq!(err.value(), "paranoid");
    }
}
