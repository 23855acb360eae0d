use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt as _;
use futures::stream;
use stream_mapper_core::{
    CanonicalEvent, DiagnosticRecorder, DiagnosticReport, MappingConfig, StreamNormalizer,
    StreamState, StreamStats, UiEvent,
};
use tracing::{debug, warn};

use crate::errors::HarnessError;

/// Response body as a stream of chunks.
pub type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<Bytes, HarnessError>> + Send + 'static>>;

/// Canonical events produced from one response body.
pub type EventStream =
    Pin<Box<dyn futures::Stream<Item = Result<UiEvent, HarnessError>> + Send + 'static>>;

/// Boxes any fallible chunk stream, turning its errors into transport errors.
pub fn byte_stream<S, B, E>(inner: S) -> ByteStream
where
    S: futures::Stream<Item = Result<B, E>> + Send + 'static,
    B: Into<Bytes>,
    E: std::fmt::Display,
{
    Box::pin(inner.map(|item| {
        item.map(Into::into)
            .map_err(|e| HarnessError::transport_msg(format!("body read failed: {e}")))
    }))
}

enum Engine {
    Plain {
        normalizer: StreamNormalizer,
        events_emitted: usize,
    },
    Recording(DiagnosticRecorder),
}

impl Engine {
    fn process(&mut self, chunk: &[u8]) -> Vec<CanonicalEvent> {
        match self {
            Self::Plain {
                normalizer,
                events_emitted,
            } => {
                let events = normalizer.process(chunk);
                *events_emitted += events.len();
                events
            }
            Self::Recording(recorder) => recorder.process(chunk),
        }
    }

    fn close(&mut self) -> Vec<CanonicalEvent> {
        match self {
            Self::Plain {
                normalizer,
                events_emitted,
            } => {
                let events = normalizer.close();
                *events_emitted += events.len();
                events
            }
            Self::Recording(recorder) => recorder.close(),
        }
    }

    fn normalizer(&self) -> &StreamNormalizer {
        match self {
            Self::Plain { normalizer, .. } => normalizer,
            Self::Recording(recorder) => recorder.normalizer(),
        }
    }

    fn into_report(self) -> DiagnosticReport {
        match self {
            Self::Plain {
                normalizer,
                events_emitted,
            } => DiagnosticReport {
                stats: normalizer.stats().clone(),
                events_emitted,
                state: normalizer.state(),
                records: Vec::new(),
            },
            Self::Recording(recorder) => recorder.into_report(),
        }
    }
}

/// Pulls chunks from a [`ByteStream`] and hands out canonical events one at
/// a time.
///
/// Reading stops as soon as the done signal is seen; the body stream is
/// released at that point. When the body ends without one, the normalizer is
/// closed and its implicit finish is delivered.
pub struct EventPump {
    bytes: ByteStream,
    engine: Engine,
    pending: VecDeque<CanonicalEvent>,
    ended: bool,
}

impl EventPump {
    pub fn new(config: Arc<MappingConfig>, bytes: ByteStream) -> Self {
        Self::with_engine(
            Engine::Plain {
                normalizer: StreamNormalizer::new(config),
                events_emitted: 0,
            },
            bytes,
        )
    }

    /// Like [`new`](Self::new), but keeps every frame for the final report.
    pub fn recording(config: Arc<MappingConfig>, bytes: ByteStream) -> Self {
        Self::with_engine(
            Engine::Recording(DiagnosticRecorder::from_config(config)),
            bytes,
        )
    }

    fn with_engine(engine: Engine, bytes: ByteStream) -> Self {
        Self {
            bytes,
            engine,
            pending: VecDeque::new(),
            ended: false,
        }
    }

    /// Returns the next event, `None` once the body is exhausted.
    ///
    /// A body read failure is returned once and ends the pump.
    pub async fn next_event(&mut self) -> Option<Result<CanonicalEvent, HarnessError>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(Ok(event));
            }
            if self.ended {
                return None;
            }
            if self.engine.normalizer().is_terminal() {
                self.ended = true;
                self.bytes = Box::pin(stream::empty());
                continue;
            }

            match self.bytes.next().await {
                Some(Ok(chunk)) => {
                    debug!(
                        event = "source.chunk",
                        domain = "source",
                        bytes = chunk.len()
                    );
                    let events = self.engine.process(&chunk);
                    self.pending.extend(events);
                }
                Some(Err(err)) => {
                    warn!(
                        event = "source.read_failed",
                        domain = "source",
                        error = %err,
                        total_frames = self.stats().total_frames
                    );
                    self.ended = true;
                    return Some(Err(err));
                }
                None => {
                    let events = self.engine.close();
                    self.pending.extend(events);
                    self.ended = true;
                }
            }
        }
    }

    pub fn state(&self) -> StreamState {
        self.engine.normalizer().state()
    }

    pub fn stats(&self) -> &StreamStats {
        self.engine.normalizer().stats()
    }

    pub fn into_report(self) -> DiagnosticReport {
        self.engine.into_report()
    }
}

/// Adapts a response body into a stream of canonical UI events.
pub fn normalize_byte_stream(
    config: Arc<MappingConfig>,
    bytes: ByteStream,
) -> impl futures::Stream<Item = Result<UiEvent, HarnessError>> + Send {
    stream::try_unfold(EventPump::new(config, bytes), |mut pump| async move {
        match pump.next_event().await {
            Some(Ok(event)) => Ok(Some((event.event, pump))),
            Some(Err(err)) => Err(err),
            None => Ok(None),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt as _;
    use serde_json::json;
    use std::convert::Infallible;

    fn config() -> Arc<MappingConfig> {
        Arc::new(
            MappingConfig::from_value(json!({
                "doneSignal": "[DONE]",
                "eventMappings": [{
                    "sourceEventType": "data",
                    "targetUiEvent": "text-delta",
                    "fieldMappings": {"delta": "choices[0].delta.content"}
                }]
            }))
            .expect("config"),
        )
    }

    fn chunks(parts: &[&'static str]) -> ByteStream {
        let items: Vec<Result<&'static [u8], Infallible>> =
            parts.iter().map(|p| Ok(p.as_bytes())).collect();
        byte_stream(stream::iter(items))
    }

    fn text(delta: &str) -> UiEvent {
        UiEvent::TextDelta {
            delta: delta.into(),
            id: None,
        }
    }

    #[tokio::test]
    async fn normalizes_chunks_split_mid_frame() {
        let bytes = chunks(&[
            "data: {\"choices\":[{\"delta\":{\"con",
            "tent\":\"Hel\"}}]}\n",
            "\ndata: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\nda",
            "ta: [DONE]\n\n",
        ]);
        let events: Vec<UiEvent> = normalize_byte_stream(config(), bytes)
            .try_collect()
            .await
            .expect("events");
        assert_eq!(events, vec![text("Hel"), text("lo")]);
    }

    #[tokio::test]
    async fn stops_reading_after_done() {
        let items: Vec<Result<&'static [u8], String>> = vec![
            Ok(b"data: [DONE]\n\n".as_slice()),
            Err("connection reset".to_string()),
        ];
        let events: Vec<UiEvent> = normalize_byte_stream(config(), byte_stream(stream::iter(items)))
            .try_collect()
            .await
            .expect("read error after done is never observed");
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn body_end_without_done_yields_implicit_finish() {
        let bytes = chunks(&["data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n\n"]);
        let events: Vec<UiEvent> = normalize_byte_stream(config(), bytes)
            .try_collect()
            .await
            .expect("events");
        assert_eq!(
            events,
            vec![
                text("x"),
                UiEvent::Finish {
                    finish_reason: None
                }
            ]
        );
    }

    #[tokio::test]
    async fn read_failure_surfaces_after_earlier_events() {
        let items: Vec<Result<&'static [u8], String>> = vec![
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\n".as_slice()),
            Err("connection reset".to_string()),
        ];
        let mut pump = EventPump::new(config(), byte_stream(stream::iter(items)));
        let first = pump.next_event().await.expect("first").expect("ok");
        assert_eq!(first.event, text("a"));
        let second = pump.next_event().await.expect("second");
        assert!(matches!(second, Err(HarnessError::Transport(msg)) if msg.contains("connection reset")));
        assert!(pump.next_event().await.is_none());
        assert_eq!(pump.state(), StreamState::Open);
    }

    #[tokio::test]
    async fn recording_pump_reports_every_frame() {
        let bytes = chunks(&[
            "event: ping\ndata: {}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\ndata: [DONE]\n\n",
        ]);
        let mut pump = EventPump::recording(config(), bytes);
        let mut emitted = 0;
        while let Some(event) = pump.next_event().await {
            event.expect("event");
            emitted += 1;
        }
        let report = pump.into_report();
        assert_eq!(emitted, 1);
        assert_eq!(report.events_emitted, 1);
        assert_eq!(report.records.len(), 3);
        assert_eq!(report.stats.unmapped, 1);
        assert_eq!(report.state, StreamState::Done);
    }
}
