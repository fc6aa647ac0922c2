/// Events emitted during an LLM streaming response.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Incremental text content from the model.
    TextDelta { text: String },

    /// Stream completed successfully.
    Done {
        model: String,
        tokens_in: u32,
        tokens_out: u32,
        stop_reason: String,
    },

    /// Error during streaming.
    Error { message: String },
}

/// Parse a single SSE line.
/// SSE format: `event: <type>\ndata: <json>\n\n`
pub fn parse_sse_line(line: &str) -> Option<SseParsed> {
    if let Some(event_type) = line.strip_prefix("event:") {
        Some(SseParsed::Event(event_type.trim_start().to_string()))
    } else {
        line.strip_prefix("data:")
            .map(|data| SseParsed::Data(data.trim_start().to_string()))
    }
}

#[derive(Debug, PartialEq)]
pub enum SseParsed {
    Event(String),
    Data(String),
}

/// Reassembles SSE lines from arbitrarily split network chunks.
///
/// Splits on raw `\n` bytes before decoding, so a multi-byte UTF-8
/// character cut across two chunks is never lost.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    buf: Vec<u8>,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk; returns every line completed by it (trimmed, non-empty).
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line);
            let text = text.trim();
            if !text.is_empty() {
                lines.push(text.to_string());
            }
        }
        lines
    }

    /// Trailing line left when the stream ends without a final newline.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buf);
        let text = String::from_utf8_lossy(&rest).trim().to_string();
        (!text.is_empty()).then_some(text)
    }
}
