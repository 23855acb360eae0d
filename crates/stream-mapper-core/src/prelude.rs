//! Common imports for embedding the normalizer.
pub use crate::{
    CanonicalEvent, ConfigError, DiagnosticRecorder, DiagnosticReport, EventMapping, Frame,
    FrameOutcome, MappingConfig, MappingResolver, PathExpr, StreamFormat, StreamNormalizer,
    StreamState, StreamStats, UiEvent, UiEventKind,
};
