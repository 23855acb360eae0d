use crate::event::UiEventKind;

/// Syntax errors in a path expression such as `choices[0].delta.content`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    /// Two dots in a row, or a leading/trailing dot.
    #[error("empty segment in path `{path}`")]
    EmptySegment { path: String },
    /// A `[` without its closing `]`.
    #[error("unterminated index in path `{path}`")]
    UnterminatedIndex { path: String },
    /// Bracket contents that are not a non-negative integer.
    #[error("invalid index `{index}` in path `{path}`")]
    InvalidIndex { path: String, index: String },
    /// A stray `]` or text between an index and the next dot.
    #[error("unexpected `{found}` in path `{path}`")]
    UnexpectedCharacter { path: String, found: char },
}

/// Errors raised while loading or validating a mapping configuration.
///
/// Only the document shape and the top-level path slots can fail a load;
/// problems inside a single rule are logged and confined to that rule.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config document is not valid JSON or has the wrong shape.
    #[error("invalid mapping config JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// A path-typed slot holds an invalid expression.
    #[error("invalid path for {slot}: {error}")]
    Path {
        slot: String,
        #[source]
        error: PathError,
    },
}

impl ConfigError {
    pub(crate) fn path(slot: impl Into<String>, error: PathError) -> Self {
        Self::Path {
            slot: slot.into(),
            error,
        }
    }
}

/// Per-frame failure to build a canonical event from a matched mapping.
///
/// Reported for the offending frame only; the stream keeps going.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// A required field has no path, or its path resolved to nothing (or `null`).
    #[error("required field `{field}` of {target} is missing")]
    MissingField {
        target: UiEventKind,
        field: &'static str,
    },
    /// A required field resolved to a JSON type it cannot carry.
    #[error("required field `{field}` of {target} cannot be built from a JSON {found}")]
    InvalidField {
        target: UiEventKind,
        field: &'static str,
        found: &'static str,
    },
}
