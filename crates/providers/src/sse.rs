//! Incremental parser for `text/event-stream` chat-completion responses.

use serde::Deserialize;
use skillsmith_core::TokenUsage;

/// One decoded stream item.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    /// A content delta (may be empty for role-only chunks).
    Delta(String),
    Usage(TokenUsage),
    Done,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<UsagePayload>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsagePayload {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

impl From<UsagePayload> for TokenUsage {
    fn from(u: UsagePayload) -> Self {
        TokenUsage {
            prompt: u.prompt_tokens,
            completion: u.completion_tokens,
            total: u.total_tokens,
        }
    }
}

/// Buffers raw bytes and yields items for every complete `data:` line.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a network chunk. Lines split across chunks are kept until their
    /// newline arrives.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<StreamItem> {
        self.buffer.extend_from_slice(bytes);
        let mut items = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            parse_line(line.trim_end_matches(['\r', '\n']), &mut items);
        }
        items
    }

    /// Flush a trailing line that had no newline.
    pub fn finish(&mut self) -> Vec<StreamItem> {
        let rest = std::mem::take(&mut self.buffer);
        let mut items = Vec::new();
        let line = String::from_utf8_lossy(&rest);
        parse_line(line.trim(), &mut items);
        items
    }
}

fn parse_line(line: &str, items: &mut Vec<StreamItem>) {
    let Some(data) = line.strip_prefix("data:") else {
        return;
    };
    let data = data.trim();
    if data == "[DONE]" {
        items.push(StreamItem::Done);
        return;
    }
    let Ok(chunk) = serde_json::from_str::<StreamChunk>(data) else {
        return;
    };
    if let Some(content) = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta)
        .and_then(|d| d.content)
    {
        items.push(StreamItem::Delta(content));
    }
    if let Some(usage) = chunk.usage {
        items.push(StreamItem::Usage(usage.into()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_lines_across_chunks() {
        let mut parser = SseParser::new();
        let first = parser.push(b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel");
        assert!(first.is_empty());
        let second = parser.push(b"lo\"}}]}\n\ndata: {\"choices\":[{\"delta\":{\"content\":\" world\"}}]}\r\n");
        assert_eq!(
            second,
            vec![
                StreamItem::Delta("Hello".to_string()),
                StreamItem::Delta(" world".to_string())
            ]
        );
    }

    #[test]
    fn test_usage_and_done() {
        let mut parser = SseParser::new();
        let items = parser.push(
            b": keep-alive\n\
              data: {\"choices\":[],\"usage\":{\"prompt_tokens\":12,\"completion_tokens\":3,\"total_tokens\":15}}\n\
              data: [DONE]\n",
        );
        assert_eq!(
            items,
            vec![
                StreamItem::Usage(TokenUsage {
                    prompt: 12,
                    completion: 3,
                    total: 15
                }),
                StreamItem::Done
            ]
        );
    }

    #[test]
    fn test_finish_flushes_unterminated_line() {
        let mut parser = SseParser::new();
        assert!(parser.push(b"data: [DONE]").is_empty());
        assert_eq!(parser.finish(), vec![StreamItem::Done]);
    }
}
