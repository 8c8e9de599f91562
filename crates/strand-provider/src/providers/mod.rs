//! Boundary parsers translating provider-native SSE payloads into
//! [`StreamPart`](crate::stream::StreamPart)s.

pub mod anthropic;
pub mod openai;

pub use anthropic::AnthropicStreamParser;
pub use openai::OpenAiStreamParser;

use crate::stream::StreamPart;

/// A stateful parser for one provider response, fed one SSE `data:` payload
/// at a time.
pub trait SseParser {
    fn parse_data(&mut self, data: &str) -> Vec<StreamPart>;

    /// Parts to emit when the transport closes without a terminal event.
    fn finish(&mut self) -> Vec<StreamPart> {
        Vec::new()
    }
}

/// Line-buffers raw SSE bytes that may split anywhere and feeds complete
/// `data:` lines to a parser.
#[derive(Debug, Default)]
pub struct SseDecoder<P> {
    buffer: String,
    parser: P,
}

impl<P: SseParser> SseDecoder<P> {
    pub fn new(parser: P) -> Self {
        Self {
            buffer: String::new(),
            parser,
        }
    }

    pub fn push(&mut self, text: &str) -> Vec<StreamPart> {
        self.buffer.push_str(text);
        self.drain(false)
    }

    /// Flush any trailing line and let the parser close open state.
    pub fn finish(&mut self) -> Vec<StreamPart> {
        let mut parts = self.drain(true);
        parts.extend(self.parser.finish());
        parts
    }

    fn drain(&mut self, flush_remainder: bool) -> Vec<StreamPart> {
        let mut parts = Vec::new();

        while let Some(newline_idx) = self.buffer.find('\n') {
            let mut line: String = self.buffer.drain(..=newline_idx).collect();
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
            parts.extend(self.parse_line(&line));
        }

        if flush_remainder && !self.buffer.is_empty() {
            let mut tail = std::mem::take(&mut self.buffer);
            if tail.ends_with('\r') {
                tail.pop();
            }
            parts.extend(self.parse_line(&tail));
        }

        parts
    }

    fn parse_line(&mut self, line: &str) -> Vec<StreamPart> {
        let line = line.trim();
        let Some(data) = line.strip_prefix("data:") else {
            return Vec::new();
        };
        let data = data.trim();
        if data.is_empty() {
            return Vec::new();
        }
        self.parser.parse_data(data)
    }
}

/// Decode a complete SSE body in one go.
pub fn decode_sse<P: SseParser>(parser: P, body: &str) -> Vec<StreamPart> {
    let mut decoder = SseDecoder::new(parser);
    let mut parts = decoder.push(body);
    parts.extend(decoder.finish());
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Echo;

    impl SseParser for Echo {
        fn parse_data(&mut self, data: &str) -> Vec<StreamPart> {
            vec![StreamPart::TextDelta {
                id: None,
                text: data.to_string(),
            }]
        }
    }

    fn texts(parts: Vec<StreamPart>) -> Vec<String> {
        parts
            .into_iter()
            .filter_map(|p| match p {
                StreamPart::TextDelta { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn handles_partial_and_multiple_lines() {
        let mut decoder = SseDecoder::new(Echo);
        assert!(decoder.push("data: {\"a\"").is_empty());
        assert_eq!(
            texts(decoder.push(":1}\r\n\ndata: two\nevent: x\ndata:")),
            vec!["{\"a\":1}".to_string(), "two".to_string()]
        );
        assert_eq!(texts(decoder.push(" three")), Vec::<String>::new());
        assert_eq!(texts(decoder.finish()), vec!["three".to_string()]);
    }
}
