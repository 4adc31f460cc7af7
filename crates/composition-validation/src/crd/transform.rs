use std::collections::BTreeMap;

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ResultExt, Snafu, ensure};

#[derive(Debug, Snafu)]
pub enum TransformShapeError {
    #[snafu(display("given transform type {transform_type} requires configuration"))]
    MissingConfig { transform_type: TransformType },

    #[snafu(display("{field} is required by {operation}"))]
    MissingField {
        field: &'static str,
        operation: String,
    },

    #[snafu(display("map transform requires at least one pair"))]
    EmptyMap,

    #[snafu(display("match transform requires at least one pattern or a fallback"))]
    EmptyMatch,

    #[snafu(display("failed to compile regular expression {pattern:?}"))]
    InvalidRegex { source: regex::Error, pattern: String },
}

#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Eq,
    Hash,
    JsonSchema,
    PartialEq,
    Serialize,
    strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TransformType {
    Map,
    Match,
    Math,
    String,
    Convert,
}

/// A transform applied to the value of a patch, in the order declared.
#[derive(Clone, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transform {
    #[serde(rename = "type")]
    pub transform_type: TransformType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub math: Option<MathTransform>,

    /// Maps string inputs to arbitrary values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map: Option<BTreeMap<String, serde_json::Value>>,

    #[serde(rename = "match", default, skip_serializing_if = "Option::is_none")]
    pub match_transform: Option<MatchTransform>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string: Option<StringTransform>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub convert: Option<ConvertTransform>,
}

/// The typed view of a [`Transform`].
#[derive(Clone, Copy, Debug)]
pub enum TransformKind<'a> {
    Convert(&'a ConvertTransform),
    Math(MathOperation),
    String(StringOperation<'a>),
    Map(&'a BTreeMap<String, serde_json::Value>),
    Match(&'a MatchTransform),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MathOperation {
    Multiply(i64),
    ClampMin(i64),
    ClampMax(i64),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StringOperation<'a> {
    Format(&'a str),
    Convert(StringConversionType),
    TrimPrefix(&'a str),
    TrimSuffix(&'a str),
    Regexp(&'a StringTransformRegexp),
    Join(&'a str),
}

impl Transform {
    /// Checks that the configuration required by the transform type is
    /// present and returns the typed view of this transform.
    pub fn kind(&self) -> Result<TransformKind<'_>, TransformShapeError> {
        let transform_type = self.transform_type;

        Ok(match transform_type {
            TransformType::Convert => TransformKind::Convert(
                self.convert
                    .as_ref()
                    .context(MissingConfigSnafu { transform_type })?,
            ),
            TransformType::Math => TransformKind::Math(
                self.math
                    .as_ref()
                    .context(MissingConfigSnafu { transform_type })?
                    .operation()?,
            ),
            TransformType::String => TransformKind::String(
                self.string
                    .as_ref()
                    .context(MissingConfigSnafu { transform_type })?
                    .operation()?,
            ),
            TransformType::Map => {
                let map = self
                    .map
                    .as_ref()
                    .context(MissingConfigSnafu { transform_type })?;
                ensure!(!map.is_empty(), EmptyMapSnafu);
                TransformKind::Map(map)
            }
            TransformType::Match => {
                let match_transform = self
                    .match_transform
                    .as_ref()
                    .context(MissingConfigSnafu { transform_type })?;
                match_transform.validate()?;
                TransformKind::Match(match_transform)
            }
        })
    }
}

#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize, strum::Display,
)]
pub enum MathTransformType {
    #[default]
    Multiply,
    ClampMin,
    ClampMax,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MathTransform {
    /// Defaults to `Multiply`.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub math_type: Option<MathTransformType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multiply: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clamp_min: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clamp_max: Option<i64>,
}

impl MathTransform {
    fn operation(&self) -> Result<MathOperation, TransformShapeError> {
        let math_type = self.math_type.unwrap_or_default();
        let missing = |field: &'static str| MissingFieldSnafu {
            field,
            operation: format!("math transform of type {math_type}"),
        };

        Ok(match math_type {
            MathTransformType::Multiply => {
                MathOperation::Multiply(self.multiply.context(missing("multiply"))?)
            }
            MathTransformType::ClampMin => {
                MathOperation::ClampMin(self.clamp_min.context(missing("clampMin"))?)
            }
            MathTransformType::ClampMax => {
                MathOperation::ClampMax(self.clamp_max.context(missing("clampMax"))?)
            }
        })
    }
}

#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize, strum::Display,
)]
pub enum StringTransformType {
    #[default]
    Format,
    Convert,
    TrimPrefix,
    TrimSuffix,
    Regexp,
    Join,
}

#[derive(
    Clone, Copy, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize, strum::Display,
)]
pub enum StringConversionType {
    ToUpper,
    ToLower,
    ToBase64,
    FromBase64,
    ToJson,
    ToSha1,
    ToSha256,
    ToSha512,
    ToAdler32,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StringTransform {
    /// Defaults to `Format`.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub string_type: Option<StringTransformType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fmt: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub convert: Option<StringConversionType>,

    /// The prefix or suffix to trim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trim: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regexp: Option<StringTransformRegexp>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join: Option<StringTransformJoin>,
}

impl StringTransform {
    fn operation(&self) -> Result<StringOperation<'_>, TransformShapeError> {
        let string_type = self.string_type.unwrap_or_default();
        let missing = |field: &'static str| MissingFieldSnafu {
            field,
            operation: format!("string transform of type {string_type}"),
        };

        Ok(match string_type {
            StringTransformType::Format => {
                StringOperation::Format(self.fmt.as_deref().context(missing("fmt"))?)
            }
            StringTransformType::Convert => {
                StringOperation::Convert(self.convert.context(missing("convert"))?)
            }
            StringTransformType::TrimPrefix => {
                StringOperation::TrimPrefix(self.trim.as_deref().context(missing("trim"))?)
            }
            StringTransformType::TrimSuffix => {
                StringOperation::TrimSuffix(self.trim.as_deref().context(missing("trim"))?)
            }
            StringTransformType::Regexp => {
                let regexp = self.regexp.as_ref().context(missing("regexp"))?;
                Regex::new(&regexp.match_pattern).context(InvalidRegexSnafu {
                    pattern: &regexp.match_pattern,
                })?;
                StringOperation::Regexp(regexp)
            }
            StringTransformType::Join => StringOperation::Join(
                &self.join.as_ref().context(missing("join"))?.separator,
            ),
        })
    }
}

#[derive(Clone, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StringTransformRegexp {
    #[serde(rename = "match")]
    pub match_pattern: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<i64>,
}

#[derive(Clone, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StringTransformJoin {
    pub separator: String,
}

#[derive(
    Clone, Copy, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize, strum::Display,
)]
pub enum MatchPatternType {
    Literal,
    Regexp,
}

#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize, strum::Display,
)]
pub enum MatchFallbackTo {
    #[default]
    Value,
    Input,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchTransform {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patterns: Vec<MatchTransformPattern>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_value: Option<serde_json::Value>,

    /// Defaults to `Value`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_to: Option<MatchFallbackTo>,
}

impl MatchTransform {
    fn validate(&self) -> Result<(), TransformShapeError> {
        ensure!(
            !self.patterns.is_empty()
                || self.fallback_value.is_some()
                || self.fallback_to == Some(MatchFallbackTo::Input),
            EmptyMatchSnafu
        );

        for pattern in &self.patterns {
            let operation = || format!("match pattern of type {}", pattern.pattern_type);
            match pattern.pattern_type {
                MatchPatternType::Literal => {
                    pattern.literal.as_ref().context(MissingFieldSnafu {
                        field: "literal",
                        operation: operation(),
                    })?;
                }
                MatchPatternType::Regexp => {
                    let regexp = pattern.regexp.as_ref().context(MissingFieldSnafu {
                        field: "regexp",
                        operation: operation(),
                    })?;
                    Regex::new(regexp).context(InvalidRegexSnafu { pattern: regexp })?;
                }
            }
        }

        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchTransformPattern {
    #[serde(rename = "type")]
    pub pattern_type: MatchPatternType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub literal: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regexp: Option<String>,

    pub result: serde_json::Value,
}

#[derive(
    Clone, Copy, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ConvertTransformType {
    String,
    Int,
    Int64,
    Bool,
    Float64,
    Object,
    Array,
}

#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ConvertTransformFormat {
    #[default]
    None,
    Quantity,
    Json,
}

#[derive(Clone, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertTransform {
    pub to_type: ConvertTransformType,

    /// Defaults to `none`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<ConvertTransformFormat>,
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use rstest::rstest;

    use super::*;

    fn transform(yaml: &str) -> Transform {
        serde_yaml::from_str(yaml).expect("transform must deserialize")
    }

    #[test]
    fn math_defaults_to_multiply() {
        let transform = transform(indoc! {"
            type: math
            math:
              multiply: 1024
        "});

        assert!(matches!(
            transform.kind(),
            Ok(TransformKind::Math(MathOperation::Multiply(1024)))
        ));
    }

    #[test]
    fn string_defaults_to_format() {
        let transform = transform(indoc! {"
            type: string
            string:
              fmt: 'prefix-%s'
        "});

        assert!(matches!(
            transform.kind(),
            Ok(TransformKind::String(StringOperation::Format("prefix-%s")))
        ));
    }

    #[rstest]
    #[case("type: convert")]
    #[case("type: map")]
    #[case("{type: map, map: {}}")]
    #[case("{type: math, math: {type: ClampMin}}")]
    #[case("{type: string, string: {type: Convert}}")]
    #[case("{type: string, string: {type: Regexp, regexp: {match: '(unclosed'}}}")]
    #[case("{type: match, match: {}}")]
    #[case("{type: match, match: {patterns: [{type: Literal, result: 1}]}}")]
    #[case("{type: match, match: {patterns: [{type: Regexp, regexp: '[', result: 1}]}}")]
    fn invalid_shape(#[case] yaml: &str) {
        transform(yaml).kind().expect_err("transform shape must be invalid");
    }

    #[test]
    fn unknown_convert_type_is_rejected() {
        serde_yaml::from_str::<Transform>("{type: convert, convert: {toType: decimal}}")
            .expect_err("decimal is not a convert type");
    }

    #[test]
    fn match_with_input_fallback_only() {
        let transform = transform("{type: match, match: {fallbackTo: Input}}");
        assert!(matches!(transform.kind(), Ok(TransformKind::Match(_))));
    }
}
