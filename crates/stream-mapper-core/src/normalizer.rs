use std::sync::Arc;

use tracing::{debug, info, trace};

use crate::config::MappingConfig;
use crate::diagnostics::{FrameObserver, NoopObserver};
use crate::errors::ResolveError;
use crate::event::{CanonicalEvent, UiEvent, UiEventKind};
use crate::frame::{Frame, FrameDecoder, decoder_for};
use crate::resolver::{FrameOutcome, MappingResolver};

/// Lifecycle of one upstream response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    /// Accepting bytes.
    Open,
    /// A done signal arrived; later bytes are ignored.
    Done,
    /// The upstream ended without a done signal (implicit finish).
    Closed,
}

/// Per-stream frame accounting.
///
/// `mapped + unmapped + resolver_errors == total_frames` always holds; the
/// done frame is counted as mapped and also in `done_frames`.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStats {
    pub total_frames: usize,
    pub mapped: usize,
    pub unmapped: usize,
    pub resolver_errors: usize,
    pub done_frames: usize,
}

/// A frame whose matched rule could not be completed.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameFailure {
    pub frame: Frame,
    pub error: ResolveError,
}

/// Turns the byte stream of one upstream response into canonical events.
///
/// One instance per response; instances share nothing but the read-only
/// config. Events come out in strict frame-arrival order.
pub struct StreamNormalizer {
    decoder: Box<dyn FrameDecoder>,
    resolver: MappingResolver,
    state: StreamState,
    stats: StreamStats,
    unmapped: Vec<Frame>,
    failures: Vec<FrameFailure>,
    finish_emitted: bool,
}

impl StreamNormalizer {
    /// Creates a normalizer using the decoder for the config's stream format.
    pub fn new(config: Arc<MappingConfig>) -> Self {
        let decoder = decoder_for(config.stream_format);
        Self::with_decoder(config, decoder)
    }

    /// Uses a caller-supplied decoder instead of the config's stream format.
    pub fn with_decoder(config: Arc<MappingConfig>, decoder: Box<dyn FrameDecoder>) -> Self {
        Self {
            decoder,
            resolver: MappingResolver::new(config),
            state: StreamState::Open,
            stats: StreamStats::default(),
            unmapped: Vec::new(),
            failures: Vec::new(),
            finish_emitted: false,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// True once the stream is done or closed and ignores further bytes.
    pub fn is_terminal(&self) -> bool {
        self.state != StreamState::Open
    }

    /// Frame counts so far.
    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    /// Frames no rule matched, in arrival order.
    pub fn unmapped_frames(&self) -> &[Frame] {
        &self.unmapped
    }

    /// Frames whose matched rule failed, in arrival order.
    pub fn failures(&self) -> &[FrameFailure] {
        &self.failures
    }

    /// The mapping config this stream is resolved against.
    pub fn config(&self) -> &MappingConfig {
        self.resolver.config()
    }

    /// Feeds one body chunk. A no-op once the stream is terminal.
    pub fn process(&mut self, chunk: &[u8]) -> Vec<CanonicalEvent> {
        self.process_observed(chunk, &mut NoopObserver)
    }

    /// Like [`process`](Self::process), reporting every frame to `observer`.
    pub fn process_observed<O: FrameObserver + ?Sized>(
        &mut self,
        chunk: &[u8],
        observer: &mut O,
    ) -> Vec<CanonicalEvent> {
        if self.is_terminal() {
            trace!(
                event = "stream.chunk_ignored",
                domain = "stream",
                state = ?self.state,
                bytes = chunk.len()
            );
            return Vec::new();
        }
        let frames = self.decoder.feed(chunk);
        self.resolve_frames(frames, observer)
    }

    /// Ends the stream: flushes the trailing partial frame and, when no done
    /// signal was seen, appends an implicit `finish` unless one was already
    /// emitted.
    pub fn close(&mut self) -> Vec<CanonicalEvent> {
        self.close_observed(&mut NoopObserver)
    }

    pub fn close_observed<O: FrameObserver + ?Sized>(
        &mut self,
        observer: &mut O,
    ) -> Vec<CanonicalEvent> {
        if self.is_terminal() {
            return Vec::new();
        }
        let frames = self.decoder.flush();
        let mut events = self.resolve_frames(frames, observer);
        if self.state == StreamState::Open {
            self.state = StreamState::Closed;
            if !self.finish_emitted {
                self.finish_emitted = true;
                events.push(CanonicalEvent::synthesized(UiEvent::Finish {
                    finish_reason: None,
                }));
            }
            info!(
                event = "stream.closed",
                domain = "stream",
                total_frames = self.stats.total_frames,
                mapped = self.stats.mapped,
                unmapped = self.stats.unmapped,
                resolver_errors = self.stats.resolver_errors
            );
        }
        events
    }

    fn resolve_frames<O: FrameObserver + ?Sized>(
        &mut self,
        frames: Vec<Frame>,
        observer: &mut O,
    ) -> Vec<CanonicalEvent> {
        let mut events = Vec::new();
        let mut frames = frames.into_iter();
        for frame in frames.by_ref() {
            self.stats.total_frames += 1;
            let outcome = self.resolver.resolve(&frame);
            observer.on_frame(&frame, &outcome);
            match outcome {
                FrameOutcome::Mapped(event) => {
                    self.stats.mapped += 1;
                    if event.kind() == UiEventKind::Finish {
                        self.finish_emitted = true;
                    }
                    events.push(event);
                }
                FrameOutcome::Unmapped { event_type } => {
                    self.stats.unmapped += 1;
                    debug!(
                        event = "mapping.frame_unmapped",
                        domain = "mapping",
                        seq = frame.sequence_number,
                        event_type = %event_type
                    );
                    self.unmapped.push(frame);
                }
                FrameOutcome::Failed(error) => {
                    self.stats.resolver_errors += 1;
                    debug!(
                        event = "mapping.frame_failed",
                        domain = "mapping",
                        seq = frame.sequence_number,
                        error = %error
                    );
                    self.failures.push(FrameFailure { frame, error });
                }
                FrameOutcome::Done => {
                    self.stats.mapped += 1;
                    self.stats.done_frames += 1;
                    self.state = StreamState::Done;
                    info!(
                        event = "stream.done_signal",
                        domain = "stream",
                        seq = frame.sequence_number,
                        total_frames = self.stats.total_frames
                    );
                    break;
                }
            }
        }
        let ignored = frames.count();
        if ignored > 0 {
            trace!(
                event = "stream.frames_after_done_ignored",
                domain = "stream",
                ignored
            );
        }
        events
    }
}
