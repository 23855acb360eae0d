//! Operator-authored mapping configuration.
//!
//! The persisted JSON shape is:
//!
//! ```json
//! {
//!   "streamFormat": "sse",
//!   "eventTypePath": "type",
//!   "doneSignal": "[DONE]",
//!   "errorPath": "error",
//!   "eventMappings": [
//!     {
//!       "sourceEventType": "data",
//!       "targetUiEvent": "text-delta",
//!       "fieldMappings": { "delta": "choices[0].delta.content" },
//!       "when": "choices[0].delta.content"
//!     }
//!   ]
//! }
//! ```
//!
//! Loading compiles every path and guard once; a loaded config is immutable
//! and can be shared by any number of concurrent streams.

use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::warn;

use crate::errors::ConfigError;
use crate::event::UiEventKind;
use crate::frame::StreamFormat;
use crate::guard::Guard;
use crate::path::PathExpr;

/// Complete mapping configuration for one upstream endpoint.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingConfig {
    /// Rules in declaration order; the first match wins.
    #[serde(default)]
    pub event_mappings: Vec<EventMapping>,
    /// Reads the logical event type from the payload instead of the wire.
    #[serde(default, deserialize_with = "event_type_path")]
    pub event_type_path: Option<PathExpr>,
    /// Raw data value or event type that ends the stream gracefully.
    #[serde(default, deserialize_with = "optional_text")]
    pub done_signal: Option<String>,
    /// Marks an unmatched frame as an upstream error when it resolves.
    #[serde(default, deserialize_with = "error_path")]
    pub error_path: Option<PathExpr>,
    /// Body layout of the upstream response.
    #[serde(default)]
    pub stream_format: StreamFormat,
}

impl MappingConfig {
    /// Loads a config from the JSON text the editor persists.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Loads a config from raw JSON bytes, for example a file read whole.
    pub fn from_json_slice(raw: &[u8]) -> Result<Self, ConfigError> {
        Ok(serde_json::from_slice(raw)?)
    }

    /// Loads a config from an already decoded JSON document.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        Ok(serde_json::from_value(value)?)
    }

    /// Appends a rule after the existing ones.
    pub fn with_mapping(mut self, mapping: EventMapping) -> Self {
        self.event_mappings.push(mapping);
        self
    }

    /// Sets the done signal. Surrounding whitespace is dropped; a blank
    /// signal clears it.
    pub fn with_done_signal(mut self, signal: impl Into<String>) -> Self {
        self.done_signal = non_blank(signal.into());
        self
    }

    /// Reads the logical event type from `path`; a blank path clears it.
    pub fn with_event_type_path(mut self, path: &str) -> Result<Self, ConfigError> {
        self.event_type_path = compile_optional("eventTypePath", path)?;
        Ok(self)
    }

    /// Marks unmatched frames carrying a value at `path` as upstream errors;
    /// a blank path clears it.
    pub fn with_error_path(mut self, path: &str) -> Result<Self, ConfigError> {
        self.error_path = compile_optional("errorPath", path)?;
        Ok(self)
    }

    /// Selects the wire decoder for response bodies.
    pub fn with_stream_format(mut self, format: StreamFormat) -> Self {
        self.stream_format = format;
        self
    }
}

/// One rule: frames of `source_event_type` become `target` events.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(from = "RawEventMapping")]
pub struct EventMapping {
    pub source_event_type: String,
    pub target: MappingTarget,
    pub when: Option<Guard>,
}

impl EventMapping {
    /// Creates an unguarded rule.
    pub fn new(source_event_type: impl Into<String>, target: MappingTarget) -> Self {
        Self {
            source_event_type: source_event_type.into(),
            target,
            when: None,
        }
    }

    /// Builds a rule from a target kind and `field -> path` pairs, the way the
    /// editor stores them. See [`MappingTarget::from_field_paths`].
    pub fn from_field_paths<'a>(
        source_event_type: impl Into<String>,
        target: UiEventKind,
        field_paths: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        Self::new(
            source_event_type,
            MappingTarget::from_field_paths(target, field_paths),
        )
    }

    /// Attaches a guard; a blank guard clears it. Unlike config loading, an
    /// invalid guard is an error here.
    pub fn when(mut self, guard: &str) -> Result<Self, ConfigError> {
        self.when = if guard.trim().is_empty() {
            None
        } else {
            Some(Guard::parse(guard)?)
        };
        Ok(self)
    }
}

/// Target event of a rule together with the paths for that event's fields.
///
/// Every variant lists exactly the fields its event carries, so a rule can
/// never name a field its target lacks. Required-field paths are still
/// optional here: an incomplete rule is reported per frame at resolve time.
#[derive(Clone, Debug, PartialEq)]
pub enum MappingTarget {
    TextDelta {
        delta: Option<PathExpr>,
        id: Option<PathExpr>,
    },
    ToolInvocation {
        tool_call_id: Option<PathExpr>,
        tool_name: Option<PathExpr>,
        args: Option<PathExpr>,
    },
    ToolResult {
        tool_call_id: Option<PathExpr>,
        result: Option<PathExpr>,
    },
    Finish {
        finish_reason: Option<PathExpr>,
    },
    Error {
        error: Option<PathExpr>,
    },
}

impl MappingTarget {
    /// The kind of event this target produces.
    pub fn kind(&self) -> UiEventKind {
        match self {
            Self::TextDelta { .. } => UiEventKind::TextDelta,
            Self::ToolInvocation { .. } => UiEventKind::ToolInvocation,
            Self::ToolResult { .. } => UiEventKind::ToolResult,
            Self::Finish { .. } => UiEventKind::Finish,
            Self::Error { .. } => UiEventKind::Error,
        }
    }

    /// Builds a target from editor-style `field -> path` pairs.
    ///
    /// A blank path is the identity and maps the whole payload. A path that
    /// does not parse never resolves, so frames report the field as missing.
    /// Field names the target does not carry are logged and ignored.
    pub fn from_field_paths<'a>(
        kind: UiEventKind,
        field_paths: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        let mut fields = FieldPaths {
            kind,
            paths: field_paths.into_iter().collect(),
        };
        let target = match kind {
            UiEventKind::TextDelta => Self::TextDelta {
                delta: fields.take("delta"),
                id: fields.take("id"),
            },
            UiEventKind::ToolInvocation => Self::ToolInvocation {
                tool_call_id: fields.take("toolCallId"),
                tool_name: fields.take("toolName"),
                args: fields.take("args"),
            },
            UiEventKind::ToolResult => Self::ToolResult {
                tool_call_id: fields.take("toolCallId"),
                result: fields.take("result"),
            },
            UiEventKind::Finish => Self::Finish {
                finish_reason: fields.take("finishReason"),
            },
            UiEventKind::Error => Self::Error {
                error: fields.take("error"),
            },
        };
        fields.finish();
        target
    }
}

struct FieldPaths<'a> {
    kind: UiEventKind,
    paths: BTreeMap<&'a str, &'a str>,
}

impl FieldPaths<'_> {
    fn take(&mut self, field: &str) -> Option<PathExpr> {
        let raw = self.paths.remove(field)?;
        Some(PathExpr::parse(raw).unwrap_or_else(|error| {
            warn!(
                event = "config.field_path_invalid",
                domain = "config",
                target = %self.kind,
                field,
                error = %error
            );
            PathExpr::unresolvable(raw)
        }))
    }

    fn finish(self) {
        for field in self.paths.into_keys() {
            warn!(
                event = "config.field_ignored",
                domain = "config",
                target = %self.kind,
                field,
                "field is not carried by the target event"
            );
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEventMapping {
    source_event_type: String,
    target_ui_event: UiEventKind,
    #[serde(default)]
    field_mappings: BTreeMap<String, String>,
    #[serde(default)]
    when: Option<String>,
}

impl From<RawEventMapping> for EventMapping {
    fn from(raw: RawEventMapping) -> Self {
        let mut mapping = Self::from_field_paths(
            raw.source_event_type,
            raw.target_ui_event,
            raw.field_mappings
                .iter()
                .map(|(field, path)| (field.as_str(), path.as_str())),
        );
        mapping.when = raw
            .when
            .filter(|guard| !guard.trim().is_empty())
            .map(|guard| {
                Guard::parse(&guard).unwrap_or_else(|error| {
                    warn!(
                        event = "config.guard_invalid",
                        domain = "config",
                        source_event_type = %mapping.source_event_type,
                        guard = %guard,
                        error = %error,
                        "rule disabled"
                    );
                    Guard::unresolvable(&guard)
                })
            });
        mapping
    }
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else if trimmed.len() == value.len() {
        Some(value)
    } else {
        Some(trimmed.to_string())
    }
}

fn compile_optional(slot: &str, raw: &str) -> Result<Option<PathExpr>, ConfigError> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    PathExpr::parse(raw)
        .map(Some)
        .map_err(|error| ConfigError::path(slot, error))
}

fn optional_path<'de, D>(slot: &str, deserializer: D) -> Result<Option<PathExpr>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) => compile_optional(slot, &raw).map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

fn event_type_path<'de, D>(deserializer: D) -> Result<Option<PathExpr>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    optional_path("eventTypePath", deserializer)
}

fn error_path<'de, D>(deserializer: D) -> Result<Option<PathExpr>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    optional_path("errorPath", deserializer)
}

fn optional_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.and_then(non_blank))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn loads_editor_json() {
        let config = MappingConfig::from_value(json!({
            "eventMappings": [{
                "sourceEventType": "data",
                "targetUiEvent": "text-delta",
                "fieldMappings": {"delta": "choices[0].delta.content"},
                "when": "choices[0].delta.content"
            }],
            "doneSignal": "[DONE]"
        }))
        .expect("config");

        assert_eq!(config.event_mappings.len(), 1);
        let mapping = &config.event_mappings[0];
        assert_eq!(mapping.source_event_type, "data");
        assert_eq!(mapping.target.kind(), UiEventKind::TextDelta);
        assert!(mapping.when.is_some());
        assert_eq!(config.done_signal.as_deref(), Some("[DONE]"));
        assert_eq!(config.stream_format, StreamFormat::Sse);
        assert!(config.event_type_path.is_none());
    }

    #[test]
    fn blank_top_level_slots_are_unset_and_blank_field_path_is_identity() {
        let config = MappingConfig::from_value(json!({
            "eventTypePath": "  ",
            "errorPath": "",
            "doneSignal": " ",
            "eventMappings": [{
                "sourceEventType": "data",
                "targetUiEvent": "text-delta",
                "fieldMappings": {"delta": "", "id": "id"},
                "when": ""
            }]
        }))
        .expect("config");
        assert!(config.event_type_path.is_none());
        assert!(config.error_path.is_none());
        assert!(config.done_signal.is_none());
        let mapping = &config.event_mappings[0];
        assert!(mapping.when.is_none());
        match &mapping.target {
            MappingTarget::TextDelta {
                delta: Some(delta),
                id: Some(_),
            } => assert!(delta.is_identity()),
            other => panic!("unexpected target {other:?}"),
        }
    }

    #[test]
    fn done_signal_is_trimmed() {
        let config = MappingConfig::from_value(json!({"doneSignal": " [DONE]\n"})).expect("config");
        assert_eq!(config.done_signal.as_deref(), Some("[DONE]"));
        let built = MappingConfig::default().with_done_signal("stop\t");
        assert_eq!(built.done_signal.as_deref(), Some("stop"));
    }

    #[test]
    fn field_not_carried_by_target_is_ignored() {
        let config = MappingConfig::from_value(json!({
            "eventMappings": [{
                "sourceEventType": "data",
                "targetUiEvent": "text-delta",
                "fieldMappings": {"delta": "text", "finishReason": "reason"}
            }]
        }))
        .expect("config");
        match &config.event_mappings[0].target {
            MappingTarget::TextDelta {
                delta: Some(delta),
                id: None,
            } => assert_eq!(delta.as_str(), "text"),
            other => panic!("unexpected target {other:?}"),
        }
    }

    #[test]
    fn bad_rule_does_not_reject_its_siblings() {
        let config = MappingConfig::from_value(json!({
            "eventMappings": [
                {"sourceEventType": "result", "targetUiEvent": "tool-result",
                 "fieldMappings": {"toolCallId": "id", "result": "out[-1]"}},
                {"sourceEventType": "data", "targetUiEvent": "finish", "when": "a[x] == 1"},
                {"sourceEventType": "data", "targetUiEvent": "text-delta",
                 "fieldMappings": {"delta": "text"}}
            ]
        }))
        .expect("config");
        assert_eq!(config.event_mappings.len(), 3);
        match &config.event_mappings[0].target {
            MappingTarget::ToolResult {
                result: Some(result),
                ..
            } => assert_eq!(result.as_str(), "out[-1]"),
            other => panic!("unexpected target {other:?}"),
        }
        let guard = config.event_mappings[1].when.as_ref().expect("guard kept");
        assert!(!guard.evaluate(&json!({"a": [1]})));
    }

    #[test]
    fn invalid_top_level_paths_name_their_slot() {
        let err = MappingConfig::from_value(json!({"errorPath": "a..b"})).expect_err("error path");
        assert!(err.to_string().contains("invalid path for errorPath"), "{err}");
        let err =
            MappingConfig::from_value(json!({"eventTypePath": "type["})).expect_err("type path");
        assert!(err.to_string().contains("invalid path for eventTypePath"), "{err}");
    }

    #[test]
    fn unknown_target_is_rejected() {
        assert!(
            MappingConfig::from_value(json!({
                "eventMappings": [{"sourceEventType": "data", "targetUiEvent": "reasoning"}]
            }))
            .is_err()
        );
    }

    #[test]
    fn builder_matches_json_shape() {
        let built = MappingConfig::default()
            .with_mapping(
                EventMapping::from_field_paths(
                    "tool",
                    UiEventKind::ToolInvocation,
                    [("toolCallId", "id"), ("toolName", "name"), ("args", "input")],
                ),
            )
            .with_done_signal("[DONE]")
            .with_error_path("error")
            .expect("error path");

        let loaded = MappingConfig::from_value(json!({
            "eventMappings": [{
                "sourceEventType": "tool",
                "targetUiEvent": "tool-invocation",
                "fieldMappings": {"toolCallId": "id", "toolName": "name", "args": "input"}
            }],
            "doneSignal": "[DONE]",
            "errorPath": "error"
        }))
        .expect("config");
        assert_eq!(built, loaded);
    }

    #[test]
    fn stream_format_is_read_from_config() {
        let config = MappingConfig::from_json_str(r#"{"streamFormat":"json"}"#).expect("config");
        assert_eq!(config.stream_format, StreamFormat::Json);
    }
}
