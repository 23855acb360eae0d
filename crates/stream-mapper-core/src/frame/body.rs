use super::{DEFAULT_EVENT_TYPE, Frame, FrameDecoder, FrameSequence};

/// Buffers the entire body and emits it as a single frame on flush.
///
/// Used for endpoints that answer with one JSON document instead of a stream.
#[derive(Debug, Default)]
pub struct WholeBodyDecoder {
    buf: Vec<u8>,
    sequence: FrameSequence,
}

impl WholeBodyDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameDecoder for WholeBodyDecoder {
    fn feed(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buf.extend_from_slice(chunk);
        Vec::new()
    }

    fn flush(&mut self) -> Vec<Frame> {
        let body = std::mem::take(&mut self.buf);
        let text = String::from_utf8_lossy(&body);
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }
        vec![
            self.sequence
                .frame(DEFAULT_EVENT_TYPE.to_string(), text.to_string()),
        ]
    }
}
