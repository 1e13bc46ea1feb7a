//! Incremental decoder for `text/event-stream` response bodies.
//!
//! The transport hands over chunks that are not aligned to lines. The decoder
//! keeps the unfinished tail between pushes and only decodes a line once its
//! newline has arrived, so a UTF-8 character split across two reads still
//! comes out whole.

use serde::Deserialize;

const DATA_PREFIX: &str = "data: ";

/// One `data:` record of the response stream
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    /// Sent before any chunk; names the answer source.
    Start {
        #[serde(default)]
        source: Option<String>,
    },
    Chunk {
        content: String,
    },
    End,
    Error {
        #[serde(default)]
        message: Option<String>,
    },
}

#[derive(Debug, Default)]
pub struct EventDecoder {
    buffer: Vec<u8>,
    /// Prefix of `buffer` already known to hold no newline.
    scanned: usize,
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one transport chunk, returning the events of every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[self.scanned..].iter().position(|&b| b == b'\n') {
            let end = self.scanned + offset;
            let line = String::from_utf8_lossy(&self.buffer[start..end]);
            if let Some(event) = parse_line(&line) {
                events.push(event);
            }
            start = end + 1;
            self.scanned = start;
        }

        self.buffer.drain(..start);
        self.scanned = self.buffer.len();
        events
    }

    /// Bytes held back waiting for a newline.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// End of input. An unterminated trailing line is dropped.
    pub fn finish(self) {
        if !self.buffer.is_empty() {
            tracing::debug!(
                bytes = self.buffer.len(),
                "discarding unterminated line at end of stream"
            );
        }
    }
}

/// Decode a single complete line. Returns `None` for lines that carry no event.
pub fn parse_line(line: &str) -> Option<StreamEvent> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let payload = line.strip_prefix(DATA_PREFIX)?;

    match serde_json::from_str::<StreamEvent>(payload) {
        Ok(StreamEvent::Chunk { content }) if content.is_empty() => {
            tracing::debug!("skipping chunk event without content");
            None
        }
        Ok(event) => Some(event),
        Err(error) => {
            tracing::warn!(%error, payload, "skipping malformed stream line");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str) -> StreamEvent {
        StreamEvent::Chunk {
            content: text.to_string(),
        }
    }

    fn concat(events: &[StreamEvent]) -> String {
        events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Chunk { content } => Some(content.as_str()),
                _ => None,
            })
            .collect()
    }

    const BODY: &str = concat!(
        "data: {\"type\": \"start\", \"source\": \"gemini\"}\n\n",
        "data: {\"type\": \"chunk\", \"content\": \"Try\"}\n\n",
        "data: {\"type\": \"chunk\", \"content\": \" restarting\"}\n\n",
        "data: {\"type\": \"chunk\", \"content\": \" the router \u{2713}\"}\n\n",
        "data: {\"type\": \"end\"}\n\n",
    );

    #[test]
    fn test_whole_body_in_one_push() {
        let mut decoder = EventDecoder::new();
        let events = decoder.push(BODY.as_bytes());

        assert_eq!(
            events,
            vec![
                StreamEvent::Start {
                    source: Some("gemini".to_string())
                },
                chunk("Try"),
                chunk(" restarting"),
                chunk(" the router \u{2713}"),
                StreamEvent::End,
            ]
        );
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_every_split_point_gives_same_content() {
        let bytes = BODY.as_bytes();
        let expected = "Try restarting the router \u{2713}";

        for split in 0..=bytes.len() {
            let mut decoder = EventDecoder::new();
            let mut events = decoder.push(&bytes[..split]);
            events.extend(decoder.push(&bytes[split..]));
            assert_eq!(concat(&events), expected, "split at byte {split}");
            assert_eq!(events.last(), Some(&StreamEvent::End));
        }
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut decoder = EventDecoder::new();
        let events: Vec<StreamEvent> = BODY
            .as_bytes()
            .iter()
            .flat_map(|b| decoder.push(std::slice::from_ref(b)))
            .collect();
        assert_eq!(concat(&events), "Try restarting the router \u{2713}");
    }

    #[test]
    fn test_three_reads_produce_hello() {
        let mut decoder = EventDecoder::new();
        let mut events = decoder.push(b"data: {\"type\":\"chunk\",\"content\":\"Hel\"}\ndata: {\"ty");
        events.extend(decoder.push(b"pe\":\"chunk\",\"content\":\"lo\"}\n"));
        events.extend(decoder.push(b"data: {\"type\":\"end\"}\n"));

        assert_eq!(events, vec![chunk("Hel"), chunk("lo"), StreamEvent::End]);
    }

    #[test]
    fn test_lines_without_data_prefix_are_ignored() {
        let mut decoder = EventDecoder::new();
        let events = decoder.push(
            b": keep-alive\nevent: message\nid: 4\n\ndata:{\"type\":\"chunk\",\"content\":\"x\"}\n",
        );
        assert!(events.is_empty());
    }

    #[test]
    fn test_malformed_line_does_not_stop_stream() {
        let mut decoder = EventDecoder::new();
        let events = decoder.push(
            b"data: {\"type\":\"chunk\",\"content\":\"a\"}\ndata: {not json\ndata: {\"type\":\"mystery\"}\ndata: {\"type\":\"chunk\",\"content\":\"b\"}\n",
        );
        assert_eq!(events, vec![chunk("a"), chunk("b")]);
    }

    #[test]
    fn test_empty_chunk_content_is_skipped() {
        assert_eq!(parse_line("data: {\"type\":\"chunk\",\"content\":\"\"}"), None);
        assert_eq!(parse_line("data: {\"type\":\"chunk\"}"), None);
    }

    #[test]
    fn test_chunk_content_is_verbatim() {
        assert_eq!(
            parse_line("data: {\"type\":\"chunk\",\"content\":\"  spaced\\nout  \"}"),
            Some(chunk("  spaced\nout  "))
        );
    }

    #[test]
    fn test_crlf_lines() {
        let mut decoder = EventDecoder::new();
        let events = decoder.push(b"data: {\"type\":\"chunk\",\"content\":\"ok\"}\r\n\r\n");
        assert_eq!(events, vec![chunk("ok")]);
    }

    #[test]
    fn test_error_event() {
        assert_eq!(
            parse_line("data: {\"type\":\"error\",\"message\":\"quota\"}"),
            Some(StreamEvent::Error {
                message: Some("quota".to_string())
            })
        );
    }

    #[test]
    fn test_error_event_with_null_or_missing_message() {
        assert_eq!(
            parse_line("data: {\"type\":\"error\",\"message\":null}"),
            Some(StreamEvent::Error { message: None })
        );
        assert_eq!(
            parse_line("data: {\"type\":\"error\"}"),
            Some(StreamEvent::Error { message: None })
        );
    }

    #[test]
    fn test_long_line_in_small_reads() {
        let content = "x".repeat(5000);
        let line = format!("data: {{\"type\":\"chunk\",\"content\":\"{}\"}}\n", content);
        let mut decoder = EventDecoder::new();
        let mut events = Vec::new();
        for piece in line.as_bytes().chunks(7) {
            events.extend(decoder.push(piece));
            if events.is_empty() {
                assert_eq!(decoder.scanned, decoder.pending());
            }
        }
        assert_eq!(events, vec![chunk(&content)]);
        assert_eq!(decoder.pending(), 0);
        assert_eq!(decoder.scanned, 0);
    }

    #[test]
    fn test_trailing_partial_line_is_held_back() {
        let mut decoder = EventDecoder::new();
        let events = decoder.push(b"data: {\"type\":\"chunk\",\"content\":\"never\"}");
        assert!(events.is_empty());
        assert!(decoder.pending() > 0);
        decoder.finish();
    }
}
