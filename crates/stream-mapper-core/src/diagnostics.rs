//! Observational tap over a [`StreamNormalizer`].
//!
//! Observers see every parsed frame together with its outcome. They cannot
//! influence the canonical output.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::mpsc;

use crate::config::MappingConfig;
use crate::event::{CanonicalEvent, UiEvent};
use crate::frame::Frame;
use crate::normalizer::{StreamNormalizer, StreamState, StreamStats};
use crate::resolver::FrameOutcome;

/// Receives `(frame, outcome)` pairs in arrival order.
pub trait FrameObserver {
    fn on_frame(&mut self, frame: &Frame, outcome: &FrameOutcome);
}

/// Observer that ignores everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl FrameObserver for NoopObserver {
    fn on_frame(&mut self, _frame: &Frame, _outcome: &FrameOutcome) {}
}

impl<F> FrameObserver for F
where
    F: FnMut(&Frame, &FrameOutcome),
{
    fn on_frame(&mut self, frame: &Frame, outcome: &FrameOutcome) {
        self(frame, outcome)
    }
}

/// Forwards records over a channel; a disconnected receiver is ignored.
impl FrameObserver for mpsc::Sender<FrameRecord> {
    fn on_frame(&mut self, frame: &Frame, outcome: &FrameOutcome) {
        let _ = self.send(FrameRecord::new(frame, outcome));
    }
}

/// Display form of a frame outcome.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecordedOutcome {
    Mapped { event: UiEvent },
    Unmapped { event_type: String },
    Error { message: String },
    Done,
}

impl From<&FrameOutcome> for RecordedOutcome {
    fn from(outcome: &FrameOutcome) -> Self {
        match outcome {
            FrameOutcome::Mapped(event) => Self::Mapped {
                event: event.event.clone(),
            },
            FrameOutcome::Unmapped { event_type } => Self::Unmapped {
                event_type: event_type.clone(),
            },
            FrameOutcome::Failed(error) => Self::Error {
                message: error.to_string(),
            },
            FrameOutcome::Done => Self::Done,
        }
    }
}

/// A raw frame paired with what became of it.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct FrameRecord {
    pub frame: Frame,
    pub result: RecordedOutcome,
}

impl FrameRecord {
    pub fn new(frame: &Frame, outcome: &FrameOutcome) -> Self {
        Self {
            frame: frame.clone(),
            result: outcome.into(),
        }
    }
}

/// Summary handed to the operator after a test run.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticReport {
    #[serde(flatten)]
    pub stats: StreamStats,
    pub events_emitted: usize,
    pub state: StreamState,
    pub records: Vec<FrameRecord>,
}

impl DiagnosticReport {
    /// Distinct logical event types that no rule matched.
    pub fn unmapped_event_types(&self) -> BTreeSet<&str> {
        self.records
            .iter()
            .filter_map(|record| match &record.result {
                RecordedOutcome::Unmapped { event_type } => Some(event_type.as_str()),
                _ => None,
            })
            .collect()
    }
}

struct RecordTap<'a>(&'a mut Vec<FrameRecord>);

impl FrameObserver for RecordTap<'_> {
    fn on_frame(&mut self, frame: &Frame, outcome: &FrameOutcome) {
        self.0.push(FrameRecord::new(frame, outcome));
    }
}

/// Wraps a [`StreamNormalizer`] and keeps every frame with its outcome.
///
/// The events returned are exactly what the wrapped normalizer returns.
pub struct DiagnosticRecorder {
    normalizer: StreamNormalizer,
    records: Vec<FrameRecord>,
    events_emitted: usize,
}

impl DiagnosticRecorder {
    pub fn new(normalizer: StreamNormalizer) -> Self {
        Self {
            normalizer,
            records: Vec::new(),
            events_emitted: 0,
        }
    }

    pub fn from_config(config: Arc<MappingConfig>) -> Self {
        Self::new(StreamNormalizer::new(config))
    }

    pub fn process(&mut self, chunk: &[u8]) -> Vec<CanonicalEvent> {
        let events = self
            .normalizer
            .process_observed(chunk, &mut RecordTap(&mut self.records));
        self.events_emitted += events.len();
        events
    }

    pub fn close(&mut self) -> Vec<CanonicalEvent> {
        let events = self
            .normalizer
            .close_observed(&mut RecordTap(&mut self.records));
        self.events_emitted += events.len();
        events
    }

    pub fn normalizer(&self) -> &StreamNormalizer {
        &self.normalizer
    }

    pub fn state(&self) -> StreamState {
        self.normalizer.state()
    }

    pub fn records(&self) -> &[FrameRecord] {
        &self.records
    }

    pub fn report(&self) -> DiagnosticReport {
        DiagnosticReport {
            stats: self.normalizer.stats().clone(),
            events_emitted: self.events_emitted,
            state: self.normalizer.state(),
            records: self.records.clone(),
        }
    }

    pub fn into_report(self) -> DiagnosticReport {
        DiagnosticReport {
            stats: self.normalizer.stats().clone(),
            events_emitted: self.events_emitted,
            state: self.normalizer.state(),
            records: self.records,
        }
    }
}
