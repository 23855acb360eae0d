//! Dotted/bracketed path expressions over decoded JSON payloads.
//!
//! Grammar: dot-separated property names, each optionally followed by one or
//! more bracketed non-negative indexes (`choices[0].delta.content`, `[0]`,
//! `a.b[2].c`, `grid[1][0]`). An empty path is the identity.

use std::fmt;

use serde_json::Value;

use crate::errors::PathError;

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
    /// Stands in for text that failed to parse; matches nothing.
    Unresolvable,
}

/// A compiled path expression.
///
/// Compile once with [`PathExpr::parse`] and evaluate with
/// [`PathExpr::resolve`]; evaluation is pure and never fails loudly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathExpr {
    source: String,
    segments: Vec<Segment>,
}

impl PathExpr {
    /// Parses a path expression. Surrounding whitespace is ignored.
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let source = raw.trim();
        let mut segments = Vec::new();
        if !source.is_empty() {
            for part in source.split('.') {
                parse_part(source, part, &mut segments)?;
            }
        }
        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    /// The identity path, which resolves to its input.
    pub fn identity() -> Self {
        Self {
            source: String::new(),
            segments: Vec::new(),
        }
    }

    /// A path that keeps `raw` as its text but never resolves.
    ///
    /// Used when a config slot holds an expression that does not parse, so
    /// the rule still loads and each frame reports the field as missing.
    pub fn unresolvable(raw: &str) -> Self {
        Self {
            source: raw.trim().to_string(),
            segments: vec![Segment::Unresolvable],
        }
    }

    pub fn is_identity(&self) -> bool {
        self.segments.is_empty()
    }

    /// Returns the normalized source text.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Resolves the path against `value`.
    ///
    /// Returns `None` (not found) when an intermediate value is `null` or of
    /// the wrong kind, a property is missing, or an index is out of bounds.
    /// A `null` at the end of the path is a found value.
    pub fn resolve<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        let mut current = value;
        for segment in &self.segments {
            current = match (segment, current) {
                (Segment::Key(key), Value::Object(map)) => map.get(key)?,
                (Segment::Index(index), Value::Array(items)) => items.get(*index)?,
                _ => return None,
            };
        }
        Some(current)
    }
}

/// Parses `path` and resolves it against `value` in one step.
///
/// Syntax errors are folded into not-found, so callers that only hold a raw
/// string (for example the one-shot response path) never see an error.
pub fn resolve<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    PathExpr::parse(path).ok()?.resolve(value)
}

fn parse_part(path: &str, part: &str, segments: &mut Vec<Segment>) -> Result<(), PathError> {
    let (name, mut rest) = match part.find('[') {
        Some(open) => part.split_at(open),
        None => (part, ""),
    };
    if name.contains(']') {
        return Err(PathError::UnexpectedCharacter {
            path: path.to_string(),
            found: ']',
        });
    }
    if name.is_empty() && rest.is_empty() {
        return Err(PathError::EmptySegment {
            path: path.to_string(),
        });
    }
    if !name.is_empty() {
        segments.push(Segment::Key(name.to_string()));
    }

    while !rest.is_empty() {
        let Some(inner) = rest.strip_prefix('[') else {
            let found = rest.chars().next().unwrap_or('?');
            return Err(PathError::UnexpectedCharacter {
                path: path.to_string(),
                found,
            });
        };
        let Some(close) = inner.find(']') else {
            return Err(PathError::UnterminatedIndex {
                path: path.to_string(),
            });
        };
        let digits = &inner[..close];
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PathError::InvalidIndex {
                path: path.to_string(),
                index: digits.to_string(),
            });
        }
        let index = digits.parse::<usize>().map_err(|_| PathError::InvalidIndex {
            path: path.to_string(),
            index: digits.to_string(),
        })?;
        segments.push(Segment::Index(index));
        rest = &inner[close + 1..];
    }
    Ok(())
}

impl fmt::Display for PathExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl std::str::FromStr for PathExpr {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl serde::Serialize for PathExpr {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> serde::Deserialize<'de> for PathExpr {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
