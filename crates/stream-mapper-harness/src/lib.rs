//! Async drivers around `stream-mapper-core`.
//!
//! The core engine performs no I/O. This crate supplies the collaborators it
//! is driven by: an HTTP client for an operator-configured endpoint, a pump
//! that feeds body chunks through a normalizer, a spawned run with a bounded
//! event channel and cancellation, and the one-shot extraction path for
//! non-streaming responses.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use futures::TryStreamExt as _;
//! use stream_mapper_harness::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), HarnessError> {
//! init_observability();
//!
//! let mapping = MappingConfig::from_json_str(
//!     r#"{"doneSignal": "[DONE]", "eventMappings": [{
//!         "sourceEventType": "data",
//!         "targetUiEvent": "text-delta",
//!         "fieldMappings": {"delta": "choices[0].delta.content"}
//!     }]}"#,
//! )?;
//! let client = EndpointClient::new(
//!     EndpointConfig::new("http://localhost:8080/v1/chat/completions")
//!         .body(serde_json::json!({"stream": true})),
//! )?;
//!
//! let events: Vec<UiEvent> = client
//!     .stream_events(Arc::new(mapping))
//!     .await?
//!     .try_collect()
//!     .await?;
//! println!("{events:?}");
//! # Ok(())
//! # }
//! ```

/// HTTP endpoint configuration and client.
pub mod endpoint;
/// Public error type used by the harness API.
pub mod errors;
/// Process-wide tracing setup.
pub mod observability;
/// One-shot field extraction from complete JSON bodies.
pub mod one_shot;
/// Common imports for typical usage.
pub mod prelude;
/// Spawned runs with a bounded event channel and cancellation.
pub mod run;
/// Downstream event sinks.
pub mod sink;
/// Body byte streams and the event pump.
pub mod source;

pub use endpoint::{EndpointClient, EndpointConfig};
pub use errors::HarnessError;
pub use observability::{
    LogOutput, ObservabilitySettings, init_observability, init_observability_with,
};
pub use one_shot::extract_field;
pub use run::{AbortHandle, RunOptions, StreamRun};
pub use sink::{EventSink, pump_into};
pub use source::{ByteStream, EventPump, EventStream, byte_stream, normalize_byte_stream};
