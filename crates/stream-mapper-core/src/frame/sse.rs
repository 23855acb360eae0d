use tracing::trace;

use super::line_buffer::LineBuffer;
use super::{DEFAULT_EVENT_TYPE, Frame, FrameDecoder, FrameSequence};

/// Incremental Server-Sent Events parser.
///
/// Carries two pieces of state between calls: the unconsumed partial line and
/// the frame being assembled (`event:` type plus collected `data:` lines).
#[derive(Debug, Default)]
pub struct SseFrameParser {
    lines: LineBuffer,
    pending_event_type: Option<String>,
    pending_data_lines: Vec<String>,
    sequence: FrameSequence,
}

impl SseFrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    fn accept_line(&mut self, line: &str, frames: &mut Vec<Frame>) {
        if line.trim().is_empty() {
            self.terminate(frames);
            return;
        }
        if line.starts_with(':') {
            return;
        }
        if let Some(rest) = line.strip_prefix("event:") {
            self.pending_event_type = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("data:") {
            self.pending_data_lines.push(rest.trim().to_string());
        } else {
            trace!(event = "sse.line_ignored", domain = "frame", line_len = line.len());
        }
    }

    fn terminate(&mut self, frames: &mut Vec<Frame>) {
        let event_type = self.pending_event_type.take();
        if self.pending_data_lines.is_empty() {
            return;
        }
        let raw_data = std::mem::take(&mut self.pending_data_lines).join("\n");
        let event_type = event_type
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| DEFAULT_EVENT_TYPE.to_string());
        frames.push(self.sequence.frame(event_type, raw_data));
    }
}

impl FrameDecoder for SseFrameParser {
    fn feed(&mut self, chunk: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        for line in self.lines.push(chunk) {
            self.accept_line(&line, &mut frames);
        }
        frames
    }

    fn flush(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        if let Some(rest) = self.lines.take_rest() {
            self.accept_line(&rest, &mut frames);
        }
        self.terminate(&mut frames);
        frames
    }
}
