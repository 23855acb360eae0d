//! Wire decoders that turn raw body bytes into discrete [`Frame`]s.
//!
//! Every decoder is fed arbitrary chunks and must produce the same frames no
//! matter where the chunk boundaries fall.

mod body;
mod line_buffer;
mod ndjson;
mod sse;

pub use body::WholeBodyDecoder;
pub use ndjson::NdjsonFrameDecoder;
pub use sse::SseFrameParser;

/// Event type assigned to frames that carry no explicit `event:` line.
pub const DEFAULT_EVENT_TYPE: &str = "data";

/// One unit of the upstream wire format.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    /// Wire-level event type (`"data"` when the frame named none).
    pub event_type: String,
    /// Payload text, multi-line data joined with `\n`.
    pub raw_data: String,
    /// Zero-based arrival position within the stream.
    pub sequence_number: u64,
}

/// Body layout of an upstream response.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamFormat {
    /// Server-Sent Events (`event:`/`data:` lines, blank-line terminated).
    #[default]
    Sse,
    /// One JSON document per line.
    Ndjson,
    /// A single JSON document for the whole body.
    Json,
}

/// Incremental decoder contract shared by all wire formats.
pub trait FrameDecoder: Send {
    /// Consumes a chunk and returns every frame it completed (possibly none).
    fn feed(&mut self, chunk: &[u8]) -> Vec<Frame>;

    /// Completes whatever is still buffered once the body has ended.
    fn flush(&mut self) -> Vec<Frame>;
}

/// Builds the decoder for `format`.
pub fn decoder_for(format: StreamFormat) -> Box<dyn FrameDecoder> {
    match format {
        StreamFormat::Sse => Box::new(SseFrameParser::new()),
        StreamFormat::Ndjson => Box::new(NdjsonFrameDecoder::new()),
        StreamFormat::Json => Box::new(WholeBodyDecoder::new()),
    }
}

/// Hands out monotonically increasing sequence numbers.
#[derive(Debug, Default)]
pub(crate) struct FrameSequence {
    next: u64,
}

impl FrameSequence {
    pub(crate) fn frame(&mut self, event_type: String, raw_data: String) -> Frame {
        let sequence_number = self.next;
        self.next = self.next.saturating_add(1);
        Frame {
            event_type,
            raw_data,
            sequence_number,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoder_for_selects_format() {
        let mut sse = decoder_for(StreamFormat::Sse);
        assert_eq!(sse.feed(b"data: 1\n\n").len(), 1);

        let mut ndjson = decoder_for(StreamFormat::Ndjson);
        assert_eq!(ndjson.feed(b"{\"a\":1}\n{\"a\":2}\n").len(), 2);

        let mut json = decoder_for(StreamFormat::Json);
        assert!(json.feed(b"{\"a\":1}\n").is_empty());
        assert_eq!(json.flush().len(), 1);
    }

    #[test]
    fn stream_format_deserializes_lowercase() {
        let format: StreamFormat = serde_json::from_str("\"ndjson\"").expect("format");
        assert_eq!(format, StreamFormat::Ndjson);
        assert_eq!(StreamFormat::default(), StreamFormat::Sse);
    }
}
