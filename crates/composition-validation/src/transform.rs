//! Type flow through transform chains.
//!
//! Starting with the type of the patch source, every transform checks that it
//! accepts the current type and computes the type it produces. The final type
//! must be compatible with the type of the patch destination.
use std::fmt::{self, Display};

use snafu::{ResultExt, Snafu, ensure};

use crate::{
    crd::{
        ConvertTransform, ConvertTransformFormat, ConvertTransformType, MatchFallbackTo,
        MatchTransform, StringConversionType, StringOperation, Transform, TransformKind,
        TransformShapeError,
    },
    error::{FieldError, Path},
    schema::KnownType,
};

/// The type flowing through a transform chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IoType {
    Known(KnownType),

    /// The schema doesn't describe the type, checks against it are skipped.
    Unknown,

    /// The output of a transform can't be determined statically, all
    /// following checks are skipped.
    Any,
}

impl From<Option<KnownType>> for IoType {
    fn from(value: Option<KnownType>) -> Self {
        value.map_or(Self::Unknown, Self::Known)
    }
}

impl Display for IoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(known) => known.fmt(f),
            Self::Unknown => f.write_str("unknown"),
            Self::Any => f.write_str("any"),
        }
    }
}

/// The input types a transform accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Accepts {
    Anything,
    OneOf(&'static [KnownType]),
}

impl Accepts {
    const NUMERIC: Self = Self::OneOf(&[KnownType::Integer, KnownType::Number]);
    const SCALAR: Self = Self::OneOf(&[
        KnownType::String,
        KnownType::Integer,
        KnownType::Number,
        KnownType::Boolean,
    ]);
    const STRING: Self = Self::OneOf(&[KnownType::String]);
    const ARRAY: Self = Self::OneOf(&[KnownType::Array]);

    fn accepts(self, input: KnownType) -> bool {
        match self {
            Self::Anything => true,
            Self::OneOf(types) => types.iter().any(|known| input.is_equivalent(*known)),
        }
    }
}

impl Display for Accepts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anything => f.write_str("any"),
            Self::OneOf(types) => {
                for (i, known) in types.iter().enumerate() {
                    let prefix = match i {
                        0 => "",
                        _ => " or ",
                    };
                    write!(f, "{prefix}{known}")?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Snafu)]
pub enum ChainError {
    #[snafu(display("invalid transform at index {index}: {source}"))]
    InvalidTransform {
        index: usize,
        source: TransformShapeError,
    },

    #[snafu(display("transform at index {index} expects input of type {expected}, got {actual}"))]
    InputMismatch {
        index: usize,
        expected: String,
        actual: KnownType,
    },

    #[snafu(display(
        "transform at index {index} can't convert {from} to {to_type} using format {format}"
    ))]
    UnsupportedConversion {
        index: usize,
        from: KnownType,
        to_type: ConvertTransformType,
        format: ConvertTransformFormat,
    },

    #[snafu(display(
        "the patch requires a transform, from and to field paths have different types ({from} != {to})"
    ))]
    TransformRequired { from: KnownType, to: KnownType },

    #[snafu(display(
        "transformed output type and to field path have different types ({output} != {to})"
    ))]
    OutputMismatch { output: KnownType, to: KnownType },
}

impl ChainError {
    /// Converts this error into a [`FieldError`] below the patch at `patch`.
    pub fn to_field_error(&self, patch: &Path, transforms: &[Transform]) -> FieldError {
        let transforms_path = patch.child("transforms");
        match self {
            Self::InvalidTransform { index, .. }
            | Self::InputMismatch { index, .. }
            | Self::UnsupportedConversion { index, .. } => FieldError::invalid(
                transforms_path.index(*index),
                transforms.get(*index),
                self.to_string(),
            ),
            Self::TransformRequired { .. } => {
                FieldError::required(transforms_path, self.to_string())
            }
            Self::OutputMismatch { .. } => {
                FieldError::invalid(transforms_path, transforms, self.to_string())
            }
        }
    }
}

/// Validates that `transforms` turn a value of type `from` into a value
/// compatible with `to`.
///
/// Unknown types are accepted by every transform. The final comparison is
/// skipped when the destination type or the resulting type is unknown, and
/// when any transform's output type is undecidable.
pub fn validate_chain(
    transforms: &[Transform],
    from: Option<KnownType>,
    to: Option<KnownType>,
) -> Result<(), ChainError> {
    let mut current = IoType::from(from);

    for (index, transform) in transforms.iter().enumerate() {
        let kind = transform.kind().context(InvalidTransformSnafu { index })?;
        current = output_type(index, &kind, current)?;

        if current == IoType::Any {
            tracing::debug!(index, "transform output is undecidable, skipping remaining type checks");
            return Ok(());
        }
    }

    let Some(to) = to else {
        return Ok(());
    };

    match (transforms.is_empty(), from, current) {
        (true, Some(from), _) => {
            ensure!(from.is_equivalent(to), TransformRequiredSnafu { from, to });
        }
        (false, _, IoType::Known(output)) => {
            ensure!(output.is_equivalent(to), OutputMismatchSnafu { output, to });
        }
        _ => {}
    }

    Ok(())
}

/// Checks the input of the transform at `index` and returns its output.
fn output_type(index: usize, kind: &TransformKind<'_>, input: IoType) -> Result<IoType, ChainError> {
    let accepts = match kind {
        TransformKind::Convert(_) => Accepts::SCALAR,
        TransformKind::Math(_) => Accepts::NUMERIC,
        TransformKind::String(operation) => string_accepts(operation),
        TransformKind::Map(_) | TransformKind::Match(_) => Accepts::STRING,
    };

    if let IoType::Known(actual) = input {
        ensure!(
            accepts.accepts(actual),
            InputMismatchSnafu {
                index,
                expected: accepts.to_string(),
                actual,
            }
        );
    }

    Ok(match kind {
        TransformKind::Convert(convert) => convert_output(index, convert, input)?,
        TransformKind::Math(_) => match input {
            IoType::Known(known) => IoType::Known(known),
            _ => IoType::Known(KnownType::Number),
        },
        TransformKind::String(StringOperation::Convert(StringConversionType::ToAdler32)) => {
            IoType::Known(KnownType::Integer)
        }
        TransformKind::String(_) => IoType::Known(KnownType::String),
        TransformKind::Map(pairs) => common_type(pairs.values().map(KnownType::of_value)),
        TransformKind::Match(match_transform) => match_output(match_transform, input),
    })
}

fn string_accepts(operation: &StringOperation<'_>) -> Accepts {
    match operation {
        StringOperation::Format(_) => Accepts::Anything,
        StringOperation::Convert(conversion) => match conversion {
            StringConversionType::ToUpper
            | StringConversionType::ToLower
            | StringConversionType::ToBase64
            | StringConversionType::FromBase64 => Accepts::STRING,
            StringConversionType::ToJson
            | StringConversionType::ToSha1
            | StringConversionType::ToSha256
            | StringConversionType::ToSha512
            | StringConversionType::ToAdler32 => Accepts::Anything,
        },
        StringOperation::TrimPrefix(_)
        | StringOperation::TrimSuffix(_)
        | StringOperation::Regexp(_) => Accepts::STRING,
        StringOperation::Join(_) => Accepts::ARRAY,
    }
}

/// The JSON type a convert transform produces.
fn convert_target(to_type: ConvertTransformType) -> KnownType {
    match to_type {
        ConvertTransformType::String => KnownType::String,
        ConvertTransformType::Int | ConvertTransformType::Int64 => KnownType::Integer,
        ConvertTransformType::Bool => KnownType::Boolean,
        ConvertTransformType::Float64 => KnownType::Number,
        ConvertTransformType::Object => KnownType::Object,
        ConvertTransformType::Array => KnownType::Array,
    }
}

/// Whether a value of type `from` can be converted to `to` using `format`.
fn is_supported_conversion(from: KnownType, to: KnownType, format: ConvertTransformFormat) -> bool {
    use ConvertTransformFormat as Format;
    use KnownType as Type;

    match (from, to, format) {
        (Type::String, Type::Integer | Type::Number, Format::None | Format::Quantity)
        | (Type::String, Type::Object | Type::Array, Format::Json)
        | (Type::String, Type::String | Type::Boolean, Format::None) => true,
        (Type::Integer | Type::Number | Type::Boolean, to, Format::None) => matches!(
            to,
            Type::String | Type::Integer | Type::Number | Type::Boolean
        ),
        _ => false,
    }
}

fn convert_output(
    index: usize,
    convert: &ConvertTransform,
    input: IoType,
) -> Result<IoType, ChainError> {
    let to = convert_target(convert.to_type);
    let format = convert.format.unwrap_or_default();

    if let IoType::Known(from) = input {
        ensure!(
            is_supported_conversion(from, to, format),
            UnsupportedConversionSnafu {
                index,
                from,
                to_type: convert.to_type,
                format,
            }
        );
    }

    Ok(IoType::Known(to))
}

fn match_output(match_transform: &MatchTransform, input: IoType) -> IoType {
    let mut types: Vec<KnownType> = match_transform
        .patterns
        .iter()
        .map(|pattern| KnownType::of_value(&pattern.result))
        .chain(match_transform.fallback_value.iter().map(KnownType::of_value))
        .collect();

    if match_transform.fallback_to == Some(MatchFallbackTo::Input) {
        match input {
            IoType::Known(known) => types.push(known),
            IoType::Unknown | IoType::Any => return IoType::Any,
        }
    }

    common_type(types)
}

/// The single type all `types` are compatible with, [`IoType::Any`] if there
/// is none.
fn common_type(types: impl IntoIterator<Item = KnownType>) -> IoType {
    let mut common = None;
    for known in types {
        common = match common {
            None => Some(known),
            Some(current) if known.is_equivalent(current) => Some(current),
            Some(current) if current.is_equivalent(known) => Some(known),
            Some(_) => return IoType::Any,
        };
    }

    common.map_or(IoType::Any, IoType::Known)
}
