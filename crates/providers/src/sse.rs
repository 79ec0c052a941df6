//! Incremental Server-Sent Events framing.
//!
//! Only `data:` lines matter to chat-completion streams. Comments, blank
//! separators, and other SSE fields are dropped. Bytes are buffered until a
//! full line arrives so multi-byte characters split across network reads
//! survive intact.

/// One framed SSE item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    /// Payload of a `data:` line, trimmed.
    Data(String),
    /// The `[DONE]` sentinel; nothing after it is meaningful.
    Done,
}

/// Line-oriented SSE parser fed with arbitrary byte slices.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes and drain every complete frame they finish.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(bytes);
        let mut frames = Vec::new();

        while let Some(line_end) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=line_end).collect();
            let line = String::from_utf8_lossy(&line);
            if let Some(frame) = parse_line(line.trim_end_matches(['\r', '\n'])) {
                frames.push(frame);
            }
        }

        frames
    }

    /// Frame a trailing line the server sent without a final newline.
    pub fn finish(&mut self) -> Option<SseFrame> {
        let rest = std::mem::take(&mut self.buffer);
        let line = String::from_utf8_lossy(&rest);
        parse_line(line.trim_end_matches('\r'))
    }
}

fn parse_line(line: &str) -> Option<SseFrame> {
    if line.is_empty() || line.starts_with(':') {
        return None;
    }

    // "data:" with or without the conventional single space
    let data = line.strip_prefix("data:")?.trim();
    if data.is_empty() {
        return None;
    }
    if data == "[DONE]" {
        return Some(SseFrame::Done);
    }
    Some(SseFrame::Data(data.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_complete_lines() {
        let mut parser = SseParser::new();
        let frames = parser.feed(b"data: {\"a\":1}\n\ndata:{\"b\":2}\n\n");
        assert_eq!(
            frames,
            vec![
                SseFrame::Data("{\"a\":1}".into()),
                SseFrame::Data("{\"b\":2}".into())
            ]
        );
    }

    #[test]
    fn buffers_partial_lines() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"data: {\"con").is_empty());
        let frames = parser.feed(b"tent\":\"x\"}\r\n");
        assert_eq!(frames, vec![SseFrame::Data("{\"content\":\"x\"}".into())]);
    }

    #[test]
    fn keeps_multibyte_characters_split_across_reads() {
        let payload = "data: {\"content\":\"héllo\"}\n".as_bytes();
        // Split inside the two-byte 'é'
        let split = payload.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let mut parser = SseParser::new();
        assert!(parser.feed(&payload[..split]).is_empty());
        let frames = parser.feed(&payload[split..]);
        assert_eq!(
            frames,
            vec![SseFrame::Data("{\"content\":\"héllo\"}".into())]
        );
    }

    #[test]
    fn skips_comments_and_other_fields() {
        let mut parser = SseParser::new();
        let frames = parser.feed(b": OPENROUTER PROCESSING\nevent: message\nid: 7\n\n");
        assert!(frames.is_empty());
    }

    #[test]
    fn recognises_done_sentinel() {
        let mut parser = SseParser::new();
        let frames = parser.feed(b"data: [DONE]\n");
        assert_eq!(frames, vec![SseFrame::Done]);
    }

    #[test]
    fn finish_flushes_unterminated_line() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"data: {\"z\":0}").is_empty());
        assert_eq!(parser.finish(), Some(SseFrame::Data("{\"z\":0}".into())));
        assert_eq!(parser.finish(), None);
    }
}
