use std::borrow::Cow;
use std::sync::Arc;

use serde_json::Value;
use tracing::trace;

use crate::config::{MappingConfig, MappingTarget};
use crate::errors::ResolveError;
use crate::event::{CanonicalEvent, UiEvent, UiEventKind};
use crate::frame::Frame;
use crate::path::PathExpr;

/// Result of resolving one frame against a mapping config.
#[derive(Clone, Debug, PartialEq)]
pub enum FrameOutcome {
    /// A rule (or the error path) produced a canonical event.
    Mapped(CanonicalEvent),
    /// No rule matched; carries the logical event type for reporting.
    Unmapped { event_type: String },
    /// A rule matched but a required field could not be extracted.
    Failed(ResolveError),
    /// The frame is the configured done signal.
    Done,
}

/// Applies a [`MappingConfig`] to individual frames.
///
/// Stateless apart from the shared config; resolving the same frame twice
/// yields the same outcome.
#[derive(Clone, Debug)]
pub struct MappingResolver {
    config: Arc<MappingConfig>,
}

impl MappingResolver {
    /// Creates a resolver over a shared config.
    pub fn new(config: Arc<MappingConfig>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MappingConfig {
        &self.config
    }

    /// Resolves one frame: the done signal first, then the first rule whose
    /// event type and guard match, then the error path.
    pub fn resolve(&self, frame: &Frame) -> FrameOutcome {
        let payload = decode_payload(&frame.raw_data);
        let event_type = self.logical_event_type(frame, &payload);

        if let Some(signal) = self.config.done_signal.as_deref()
            && (frame.raw_data == signal || event_type == signal)
        {
            return FrameOutcome::Done;
        }

        let selected = self.config.event_mappings.iter().find(|mapping| {
            mapping.source_event_type == event_type
                && mapping
                    .when
                    .as_ref()
                    .is_none_or(|guard| guard.evaluate(&payload))
        });

        if let Some(mapping) = selected {
            trace!(
                event = "mapping.rule_selected",
                domain = "mapping",
                seq = frame.sequence_number,
                event_type = %event_type,
                target = %mapping.target.kind()
            );
            return match mapping.target.extract(&payload) {
                Ok(event) => FrameOutcome::Mapped(CanonicalEvent::from_frame(event, frame)),
                Err(err) => FrameOutcome::Failed(err),
            };
        }

        if let Some(error) = self
            .config
            .error_path
            .as_ref()
            .and_then(|path| lookup(Some(path), &payload))
        {
            let event = UiEvent::Error {
                error: error.clone(),
            };
            return FrameOutcome::Mapped(CanonicalEvent::from_frame(event, frame));
        }

        FrameOutcome::Unmapped {
            event_type: event_type.into_owned(),
        }
    }

    fn logical_event_type<'f>(&self, frame: &'f Frame, payload: &Value) -> Cow<'f, str> {
        self.config
            .event_type_path
            .as_ref()
            .and_then(|path| path.resolve(payload))
            .and_then(scalar_text)
            .map(Cow::Owned)
            .unwrap_or(Cow::Borrowed(frame.event_type.as_str()))
    }
}

impl MappingTarget {
    /// Extracts this target's fields from a decoded payload.
    ///
    /// Required fields must resolve; optional ones are dropped when they do not.
    pub fn extract(&self, payload: &Value) -> Result<UiEvent, ResolveError> {
        let kind = self.kind();
        let event = match self {
            Self::TextDelta { delta, id } => UiEvent::TextDelta {
                delta: required_text(kind, "delta", delta.as_ref(), payload)?,
                id: optional_text(id.as_ref(), payload),
            },
            Self::ToolInvocation {
                tool_call_id,
                tool_name,
                args,
            } => UiEvent::ToolInvocation {
                tool_call_id: required_text(kind, "toolCallId", tool_call_id.as_ref(), payload)?,
                tool_name: required_text(kind, "toolName", tool_name.as_ref(), payload)?,
                args: decode_embedded_json(required_json(kind, "args", args.as_ref(), payload)?),
            },
            Self::ToolResult {
                tool_call_id,
                result,
            } => UiEvent::ToolResult {
                tool_call_id: required_text(kind, "toolCallId", tool_call_id.as_ref(), payload)?,
                result: required_json(kind, "result", result.as_ref(), payload)?,
            },
            Self::Finish { finish_reason } => UiEvent::Finish {
                finish_reason: optional_text(finish_reason.as_ref(), payload),
            },
            Self::Error { error } => UiEvent::Error {
                error: required_json(kind, "error", error.as_ref(), payload)?,
            },
        };
        Ok(event)
    }
}

/// Frames that are not JSON keep their raw text as a string payload, so string
/// sentinels still compare and identity paths still resolve.
fn decode_payload(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// `null` counts as absent.
fn lookup<'a>(path: Option<&PathExpr>, payload: &'a Value) -> Option<&'a Value> {
    path?.resolve(payload).filter(|value| !value.is_null())
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn required_text(
    target: UiEventKind,
    field: &'static str,
    path: Option<&PathExpr>,
    payload: &Value,
) -> Result<String, ResolveError> {
    let value = lookup(path, payload).ok_or(ResolveError::MissingField { target, field })?;
    scalar_text(value).ok_or_else(|| ResolveError::InvalidField {
        target,
        field,
        found: json_type_name(value),
    })
}

fn optional_text(path: Option<&PathExpr>, payload: &Value) -> Option<String> {
    lookup(path, payload).and_then(scalar_text)
}

fn required_json(
    target: UiEventKind,
    field: &'static str,
    path: Option<&PathExpr>,
    payload: &Value,
) -> Result<Value, ResolveError> {
    lookup(path, payload)
        .cloned()
        .ok_or(ResolveError::MissingField { target, field })
}

/// Tool arguments often arrive as JSON text; decode them when they hold a
/// JSON object or array.
fn decode_embedded_json(value: Value) -> Value {
    if let Value::String(text) = &value
        && let Ok(decoded @ (Value::Object(_) | Value::Array(_))) =
            serde_json::from_str::<Value>(text)
    {
        return decoded;
    }
    value
}
