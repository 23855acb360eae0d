use super::line_buffer::LineBuffer;
use super::{DEFAULT_EVENT_TYPE, Frame, FrameDecoder, FrameSequence};

/// Newline-delimited JSON: every non-blank line is one `data` frame.
#[derive(Debug, Default)]
pub struct NdjsonFrameDecoder {
    lines: LineBuffer,
    sequence: FrameSequence,
}

impl NdjsonFrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn accept_line(&mut self, line: &str, frames: &mut Vec<Frame>) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        frames.push(
            self.sequence
                .frame(DEFAULT_EVENT_TYPE.to_string(), line.to_string()),
        );
    }
}

impl FrameDecoder for NdjsonFrameDecoder {
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
        frames
    }
}
