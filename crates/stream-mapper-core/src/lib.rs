//! Data-driven normalization of upstream AI event streams.
//!
//! An operator describes, as JSON, how the frames of some upstream response
//! map onto a small set of canonical UI events. A [`StreamNormalizer`] then
//! turns the raw body bytes of each response into those events, incrementally
//! and independent of how the bytes were chunked.
//!
//! ```
//! use std::sync::Arc;
//!
//! use stream_mapper_core::prelude::*;
//!
//! let config = MappingConfig::from_json_str(
//!     r#"{
//!         "doneSignal": "[DONE]",
//!         "eventMappings": [{
//!             "sourceEventType": "data",
//!             "targetUiEvent": "text-delta",
//!             "fieldMappings": { "delta": "choices[0].delta.content" }
//!         }]
//!     }"#,
//! )?;
//!
//! let mut normalizer = StreamNormalizer::new(Arc::new(config));
//! let events = normalizer.process(
//!     b"data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\ndata: [DONE]\n\n",
//! );
//! assert_eq!(
//!     events[0].event,
//!     UiEvent::TextDelta { delta: "Hi".into(), id: None }
//! );
//! assert_eq!(normalizer.state(), StreamState::Done);
//! # Ok::<(), ConfigError>(())
//! ```

/// Mapping configuration model and loading.
pub mod config;
/// Observers, frame records and the diagnostic recorder.
pub mod diagnostics;
/// Error types for paths, config loading and per-frame resolution.
pub mod errors;
/// Canonical UI events.
pub mod event;
/// Wire decoders (SSE, NDJSON, whole-body JSON).
pub mod frame;
/// `when` guard expressions.
pub mod guard;
/// Per-response stream state machine.
pub mod normalizer;
/// Dotted/indexed path expressions over JSON values.
pub mod path;
/// Common imports for typical usage.
pub mod prelude;
/// Frame-to-event resolution against a config.
pub mod resolver;

pub use config::{EventMapping, MappingConfig, MappingTarget};
pub use diagnostics::{
    DiagnosticRecorder, DiagnosticReport, FrameObserver, FrameRecord, NoopObserver,
    RecordedOutcome,
};
pub use errors::{ConfigError, PathError, ResolveError};
pub use event::{CanonicalEvent, UiEvent, UiEventKind};
pub use frame::{Frame, FrameDecoder, SseFrameParser, StreamFormat};
pub use guard::Guard;
pub use normalizer::{FrameFailure, StreamNormalizer, StreamState, StreamStats};
pub use path::{PathExpr, resolve};
pub use resolver::{FrameOutcome, MappingResolver};
