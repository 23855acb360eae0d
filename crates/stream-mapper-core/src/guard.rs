//! `when` guards on event mappings.
//!
//! The grammar is deliberately closed:
//!
//! | form | holds when |
//! |---|---|
//! | `path` | the path resolves to a truthy value |
//! | `!path` | the path is absent or falsy |
//! | `path == literal` | the path resolves to a value equal to `literal` |
//! | `path != literal` | the path resolves to a value not equal to `literal` |
//!
//! A literal is a JSON value (`"text"`, `42`, `true`, `null`); anything that
//! does not parse as JSON is taken as a bare string. Comparisons against a
//! path that does not resolve are false. Integers compare exactly; only a
//! float on either side falls back to floating-point equality.

use std::fmt;

use serde_json::Value;

use crate::errors::{ConfigError, PathError};
use crate::path::PathExpr;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Comparison {
    Equal,
    NotEqual,
}

#[derive(Clone, Debug, PartialEq)]
enum GuardExpr {
    Truthy(PathExpr),
    Falsy(PathExpr),
    Compare {
        path: PathExpr,
        op: Comparison,
        literal: Value,
    },
    Never,
}

/// A compiled guard predicate over a decoded payload.
#[derive(Clone, Debug, PartialEq)]
pub struct Guard {
    source: String,
    expr: GuardExpr,
}

impl Guard {
    /// Compiles a guard expression; only the path part can be invalid.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let source = raw.trim().to_string();
        let expr = parse_expr(&source).map_err(|error| ConfigError::path("guard", error))?;
        Ok(Self { source, expr })
    }

    /// A guard that keeps `raw` as its text and never holds.
    ///
    /// Config loading uses it for guards that do not parse, which turns the
    /// rule off instead of rejecting the whole config.
    pub fn unresolvable(raw: &str) -> Self {
        Self {
            source: raw.trim().to_string(),
            expr: GuardExpr::Never,
        }
    }

    /// Returns the normalized guard text.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Evaluates the guard. Never fails: anything that cannot be evaluated is false.
    pub fn evaluate(&self, payload: &Value) -> bool {
        match &self.expr {
            GuardExpr::Truthy(path) => is_truthy(path.resolve(payload)),
            GuardExpr::Falsy(path) => !is_truthy(path.resolve(payload)),
            GuardExpr::Compare { path, op, literal } => match path.resolve(payload) {
                None => false,
                Some(value) => {
                    let equal = values_equal(value, literal);
                    match op {
                        Comparison::Equal => equal,
                        Comparison::NotEqual => !equal,
                    }
                }
            },
            GuardExpr::Never => false,
        }
    }
}

impl fmt::Display for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn parse_expr(source: &str) -> Result<GuardExpr, PathError> {
    if let Some((at, op)) = find_operator(source) {
        let path = PathExpr::parse(&source[..at])?;
        let literal = parse_literal(&source[at + 2..]);
        return Ok(GuardExpr::Compare { path, op, literal });
    }
    if let Some(rest) = source.strip_prefix('!') {
        return Ok(GuardExpr::Falsy(PathExpr::parse(rest)?));
    }
    Ok(GuardExpr::Truthy(PathExpr::parse(source)?))
}

/// Finds the first `==` or `!=`. Paths cannot contain `=`, so the first hit
/// always separates the path from the literal.
fn find_operator(source: &str) -> Option<(usize, Comparison)> {
    let bytes = source.as_bytes();
    bytes.windows(2).enumerate().find_map(|(at, pair)| match pair {
        b"==" => Some((at, Comparison::Equal)),
        b"!=" => Some((at, Comparison::NotEqual)),
        _ => None,
    })
}

fn parse_literal(raw: &str) -> Value {
    let raw = raw.trim();
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// JavaScript-like truthiness; an unresolved path is falsy.
pub(crate) fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => {
            if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
                return a == b;
            }
            if let (Some(a), Some(b)) = (a.as_u64(), b.as_u64()) {
                return a == b;
            }
            if a.is_f64() || b.is_f64() {
                return a.as_f64() == b.as_f64();
            }
            // One side negative, the other above i64::MAX.
            false
        }
        _ => left == right,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn holds(guard: &str, payload: Value) -> bool {
        Guard::parse(guard).expect("guard").evaluate(&payload)
    }

    #[test]
    fn truthiness_guard() {
        assert!(holds("delta.content", json!({"delta": {"content": "x"}})));
        assert!(!holds("delta.content", json!({"delta": {"content": ""}})));
        assert!(!holds("delta.content", json!({"delta": {}})));
        assert!(!holds("flag", json!({"flag": 0})));
        assert!(holds("items", json!({"items": [1]})));
        assert!(!holds("items", json!({"items": []})));
    }

    #[test]
    fn negated_guard_holds_for_absent_path() {
        assert!(holds("!delta.tool_calls", json!({"delta": {}})));
        assert!(!holds("!delta.tool_calls", json!({"delta": {"tool_calls": [{}]}})));
    }

    #[test]
    fn equality_against_quoted_bare_and_numeric_literals() {
        assert!(holds("type == \"content_block_delta\"", json!({"type": "content_block_delta"})));
        assert!(holds("type == content_block_delta", json!({"type": "content_block_delta"})));
        assert!(holds("index == 1", json!({"index": 1.0})));
        assert!(holds("done == true", json!({"done": true})));
        assert!(holds("choices[0].finish_reason == null", json!({"choices": [{"finish_reason": null}]})));
        assert!(!holds("type == a", json!({"type": "b"})));
    }

    #[test]
    fn inequality_requires_a_resolved_value() {
        assert!(holds("type != ping", json!({"type": "delta"})));
        assert!(!holds("type != ping", json!({"type": "ping"})));
        assert!(!holds("type != ping", json!({})));
        assert!(!holds("type == ping", json!({})));
    }

    #[test]
    fn evaluating_against_raw_string_payload_is_false() {
        assert!(!holds("choices[0].delta", Value::String("[DONE]".into())));
        assert!(holds("!choices", Value::String("[DONE]".into())));
    }

    #[test]
    fn invalid_guard_path_is_a_config_error() {
        assert!(matches!(
            Guard::parse("a[x] == 1"),
            Err(ConfigError::Path { .. })
        ));
    }

    #[test]
    fn large_integers_compare_exactly() {
        assert!(holds("id == 9007199254740993", json!({"id": 9007199254740993_u64})));
        assert!(!holds("id == 9007199254740992", json!({"id": 9007199254740993_u64})));
        assert!(holds("id != 18446744073709551615", json!({"id": 18446744073709551614_u64})));
        assert!(!holds("id == -1", json!({"id": 18446744073709551615_u64})));
        assert!(holds("ratio == 0.5", json!({"ratio": 0.5})));
    }

    #[test]
    fn unresolvable_guard_never_holds() {
        let guard = Guard::unresolvable("a[x] == 1");
        assert_eq!(guard.as_str(), "a[x] == 1");
        assert!(!guard.evaluate(&json!({"a": [1]})));
        assert!(!guard.evaluate(&Value::Null));
    }

    #[test]
    fn keeps_source_text() {
        let guard = Guard::parse("  a.b == 2 ").expect("guard");
        assert_eq!(guard.as_str(), "a.b == 2");
    }
}
