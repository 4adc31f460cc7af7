use std::{
    fmt::{self, Display, Write},
    num::ParseIntError,
    ops::Deref,
    str::FromStr,
};

use snafu::{OptionExt, ResultExt, Snafu, ensure};

use crate::Segment;

#[cfg(feature = "serde")]
mod serde;

/// Error variants which can be encountered when parsing a [`FieldPath`] from
/// unparsed input. Positions are byte offsets into the input.
#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum ParseFieldPathError {
    #[snafu(display("field name at position {position} must not be empty"))]
    EmptyField { position: usize },

    #[snafu(display("bracket opened at position {position} is never closed"))]
    UnclosedBracket { position: usize },

    #[snafu(display("brackets at position {position} must not be empty"))]
    EmptyBracket { position: usize },

    #[snafu(display("unexpected closing bracket at position {position}"))]
    UnexpectedClosingBracket { position: usize },

    #[snafu(display(
        "unexpected character {character:?} at position {position}, expected '.' or '['"
    ))]
    UnexpectedCharacter { character: char, position: usize },

    #[snafu(display("failed to parse {input:?} as array index"))]
    ParseIndex {
        source: ParseIntError,
        input: String,
    },
}

/// A parsed field path, for example `spec.parameters.tags[0]`.
///
/// The grammar is intentionally small:
///
/// - field names are separated by dots: `spec.parameters`
/// - array positions are written as `[<N>]`: `tags[0]`
/// - field names which contain dots are written in brackets, optionally
///   quoted: `labels[app.kubernetes.io/name]` or `labels['example.com/x']`
///
/// The empty string parses into an empty path.
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq)]
pub struct FieldPath {
    segments: Vec<Segment>,
}

impl FromStr for FieldPath {
    type Err = ParseFieldPathError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let mut segments = Vec::new();
        let mut position = 0;
        let mut after_dot = false;

        while position < input.len() {
            let rest = &input[position..];

            if rest.starts_with('[') {
                // "spec.[0]" is missing a field name between the dot and the bracket
                ensure!(!after_dot, EmptyFieldSnafu { position });

                let close = rest.find(']').context(UnclosedBracketSnafu { position })?;
                segments.push(parse_bracket(&rest[1..close], position)?);
                position += close + 1;
            } else {
                let end = rest.find(['.', '[', ']']).unwrap_or(rest.len());
                ensure!(end > 0, EmptyFieldSnafu { position });

                segments.push(Segment::field(&rest[..end]));
                position += end;
            }

            after_dot = false;
            match input[position..].chars().next() {
                None | Some('[') => {}
                Some('.') => {
                    position += 1;
                    after_dot = true;
                    // Trailing dots are not allowed
                    ensure!(position < input.len(), EmptyFieldSnafu { position });
                }
                Some(']') => return UnexpectedClosingBracketSnafu { position }.fail(),
                Some(character) => {
                    return UnexpectedCharacterSnafu {
                        character,
                        position,
                    }
                    .fail();
                }
            }
        }

        Ok(Self { segments })
    }
}

/// Parses the content between two brackets, `position` points at the opening
/// bracket.
fn parse_bracket(content: &str, position: usize) -> Result<Segment, ParseFieldPathError> {
    ensure!(!content.is_empty(), EmptyBracketSnafu { position });

    for quote in ['\'', '"'] {
        if content.len() >= 2 && content.starts_with(quote) && content.ends_with(quote) {
            let name = &content[1..content.len() - 1];
            ensure!(!name.is_empty(), EmptyBracketSnafu { position });
            return Ok(Segment::field(name));
        }
    }

    if content.bytes().all(|byte| byte.is_ascii_digit()) {
        let index = content
            .parse::<usize>()
            .context(ParseIndexSnafu { input: content })?;
        return Ok(Segment::Index(index));
    }

    Ok(Segment::field(content))
}

impl TryFrom<&str> for FieldPath {
    type Error = ParseFieldPathError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::from_str(value)
    }
}

impl Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Field(name) if !Segment::needs_brackets(name) => {
                    if i > 0 {
                        f.write_char('.')?;
                    }
                    f.write_str(name)?;
                }
                other => write!(f, "{other}")?,
            }
        }
        Ok(())
    }
}

impl Deref for FieldPath {
    type Target = [Segment];

    fn deref(&self) -> &Self::Target {
        &self.segments
    }
}

impl From<Vec<Segment>> for FieldPath {
    fn from(segments: Vec<Segment>) -> Self {
        Self { segments }
    }
}

impl FromIterator<Segment> for FieldPath {
    fn from_iter<T: IntoIterator<Item = Segment>>(iter: T) -> Self {
        Self {
            segments: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a FieldPath {
    type IntoIter = std::slice::Iter<'a, Segment>;
    type Item = &'a Segment;

    fn into_iter(self) -> Self::IntoIter {
        self.segments.iter()
    }
}

impl FieldPath {
    /// Returns all segments of this path in order.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Appends a segment to the end of this path.
    pub fn push(&mut self, segment: impl Into<Segment>) {
        self.segments.push(segment.into());
    }

    /// Returns a new path with all segments of `other` appended.
    pub fn join(&self, other: &Self) -> Self {
        self.segments
            .iter()
            .chain(other.segments.iter())
            .cloned()
            .collect()
    }
}
