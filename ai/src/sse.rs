//! Line-buffered decoding of `text/event-stream` bodies.

use bytes::BytesMut;

/// Collects bytes until full lines are available and yields their `data:` payloads.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: BytesMut,
}

impl SseDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a network chunk and returns the payload of every completed `data:` line.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut payloads = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line = self.buffer.split_to(pos + 1);
            let line = String::from_utf8_lossy(&line);
            if let Some(data) = parse_sse_line(&line) {
                payloads.push(data.to_string());
            }
        }

        payloads
    }

    /// Returns the payload of a trailing line that never got its newline.
    pub fn finish(&mut self) -> Option<String> {
        let rest = self.buffer.split();
        let line = String::from_utf8_lossy(&rest);
        parse_sse_line(&line).map(ToString::to_string)
    }
}

fn parse_sse_line(line: &str) -> Option<&str> {
    line.trim_end_matches(['\r', '\n'])
        .strip_prefix("data:")
        .map(str::trim_start)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payloads_split_across_chunks_are_joined() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"a\":").is_empty());
        assert_eq!(decoder.push(b"1}\n\ndata: [DONE]\n\n"), vec!["{\"a\":1}", "[DONE]"]);
    }

    #[test]
    fn comments_and_event_names_are_skipped() {
        let mut decoder = SseDecoder::new();
        let payloads = decoder.push(b": OPENROUTER PROCESSING\r\nevent: message\r\ndata:x\r\n");
        assert_eq!(payloads, vec!["x"]);
    }

    #[test]
    fn finish_flushes_unterminated_line() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: tail").is_empty());
        assert_eq!(decoder.finish().as_deref(), Some("tail"));
        assert_eq!(decoder.finish(), None);
    }
}
