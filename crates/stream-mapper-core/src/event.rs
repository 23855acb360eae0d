use std::fmt;

use serde_json::Value;

use crate::frame::Frame;

/// Discriminant of a canonical UI event, as named in mapping configs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UiEventKind {
    TextDelta,
    ToolInvocation,
    ToolResult,
    Finish,
    Error,
}

impl UiEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TextDelta => "text-delta",
            Self::ToolInvocation => "tool-invocation",
            Self::ToolResult => "tool-result",
            Self::Finish => "finish",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for UiEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical event consumed by the chat UI.
///
/// Serialized as a discriminated object, e.g.
/// `{"type":"text-delta","delta":"Hi"}`. Absent optional fields are omitted.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum UiEvent {
    /// Incremental assistant text.
    TextDelta {
        delta: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    /// The model asked for a tool call.
    ToolInvocation {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
        args: Value,
    },
    /// Result of an earlier tool call.
    ToolResult {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        result: Value,
    },
    /// End of the assistant turn.
    Finish {
        #[serde(
            rename = "finishReason",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        finish_reason: Option<String>,
    },
    /// Upstream-reported error, rendered by the sink.
    Error { error: Value },
}

impl UiEvent {
    pub fn kind(&self) -> UiEventKind {
        match self {
            Self::TextDelta { .. } => UiEventKind::TextDelta,
            Self::ToolInvocation { .. } => UiEventKind::ToolInvocation,
            Self::ToolResult { .. } => UiEventKind::ToolResult,
            Self::Finish { .. } => UiEventKind::Finish,
            Self::Error { .. } => UiEventKind::Error,
        }
    }
}

/// A canonical event plus the frame it was built from.
///
/// `source_frame` is `None` only for the implicit `finish` synthesized when
/// the upstream closes without a done signal.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalEvent {
    pub event: UiEvent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_frame: Option<Frame>,
}

impl CanonicalEvent {
    pub fn from_frame(event: UiEvent, frame: &Frame) -> Self {
        Self {
            event,
            source_frame: Some(frame.clone()),
        }
    }

    pub fn synthesized(event: UiEvent) -> Self {
        Self {
            event,
            source_frame: None,
        }
    }

    pub fn kind(&self) -> UiEventKind {
        self.event.kind()
    }
}
