//! Minimal SSE wire-format parser for southbound frame streams.

/// Incremental parser turning raw SSE bytes into `data:` payloads. Handles
/// chunk boundaries anywhere, `\r\n` line endings, multi-line data blocks,
/// and keepalive comments.
#[derive(Debug, Default)]
pub(crate) struct SseParser {
    buffer: Vec<u8>,
    data: String,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes, returning every completed `data` payload.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut payloads = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }

            if line.is_empty() {
                if !self.data.is_empty() {
                    payloads.push(std::mem::take(&mut self.data));
                }
                continue;
            }
            if line.starts_with(b":") {
                continue;
            }

            let Ok(text) = std::str::from_utf8(&line) else {
                continue;
            };
            if let Some(value) = text.strip_prefix("data:") {
                let value = value.strip_prefix(' ').unwrap_or(value);
                if !self.data.is_empty() {
                    self.data.push('\n');
                }
                self.data.push_str(value);
            }
            // event/id/retry fields carry nothing we use
        }

        payloads
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_one_event() {
        let mut parser = SseParser::new();
        let out = parser.feed(b"data: {\"status\":\"OK\"}\n\n");
        assert_eq!(out, vec!["{\"status\":\"OK\"}".to_string()]);
    }

    #[test]
    fn parses_events_split_across_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"data: {\"a\"").is_empty());
        let out = parser.feed(b":1}\n\ndata: {\"b\":2}\n\n");
        assert_eq!(out, vec!["{\"a\":1}".to_string(), "{\"b\":2}".to_string()]);
    }

    #[test]
    fn skips_comments_and_crlf() {
        let mut parser = SseParser::new();
        let out = parser.feed(b": keepalive\r\ndata: {}\r\n\r\n");
        assert_eq!(out, vec!["{}".to_string()]);
    }
}
