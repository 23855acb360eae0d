//! Common imports for typical harness usage.
pub use crate::{
    AbortHandle, ByteStream, EndpointClient, EndpointConfig, EventPump, EventSink, HarnessError,
    ObservabilitySettings, RunOptions, StreamRun, byte_stream, extract_field, init_observability,
    init_observability_with, normalize_byte_stream, pump_into,
};
pub use stream_mapper_core::{
    CanonicalEvent, DiagnosticReport, MappingConfig, StreamState, UiEvent, UiEventKind,
};
