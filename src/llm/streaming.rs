//! Streaming response handling

use std::pin::Pin;

use futures::Stream;
use serde::Deserialize;

use crate::errors::Result;

/// Streaming response from an LLM provider
pub struct StreamingResponse {
    stream: Pin<Box<dyn Stream<Item = Result<String>> + Send>>,
}

impl StreamingResponse {
    pub fn new(stream: Pin<Box<dyn Stream<Item = Result<String>> + Send>>) -> Self {
        Self { stream }
    }

    /// Collect all chunks into a single string
    pub async fn collect_all(mut self) -> Result<String> {
        use futures::StreamExt;
        let mut result = String::new();
        while let Some(chunk) = self.stream.next().await {
            result.push_str(&chunk?);
        }
        Ok(result)
    }

    /// Get the underlying stream
    pub fn into_stream(self) -> Pin<Box<dyn Stream<Item = Result<String>> + Send>> {
        self.stream
    }
}

/// Wire framing of an upstream token stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFraming {
    /// Server-sent events: `data:`-prefixed lines, `[DONE]` end sentinel
    Sse,
    /// Newline-delimited JSON records with a `done` flag (Ollama)
    Ndjson,
}

/// Incremental decoder for provider token streams.
///
/// Feed raw transport bytes and collect emitted text deltas. Lines that do
/// not parse as a delta record are skipped; one bad line never fails the
/// stream. Once the end sentinel is seen, all further input is discarded.
#[derive(Debug)]
pub struct DeltaDecoder {
    framing: StreamFraming,
    // Raw bytes: a multibyte UTF-8 character may be split across
    // transport chunks, so decoding happens per completed line.
    buffer: Vec<u8>,
    done: bool,
}

#[derive(Deserialize)]
struct SseDelta {
    #[serde(default)]
    choices: Vec<SseChoice>,
}

#[derive(Deserialize)]
struct SseChoice {
    #[serde(default)]
    delta: SseContent,
}

#[derive(Deserialize, Default)]
struct SseContent {
    content: Option<String>,
}

#[derive(Deserialize)]
struct NdjsonDelta {
    message: Option<NdjsonMessage>,
    #[serde(default)]
    done: bool,
}

#[derive(Deserialize)]
struct NdjsonMessage {
    content: Option<String>,
}

impl DeltaDecoder {
    #[must_use]
    pub const fn new(framing: StreamFraming) -> Self {
        Self {
            framing,
            buffer: Vec::new(),
            done: false,
        }
    }

    /// Whether the stream end sentinel has been observed
    #[must_use]
    pub const fn is_done(&self) -> bool {
        self.done
    }

    /// Feed a transport chunk; returns the text deltas completed by it
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut deltas = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if self.done {
                continue;
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(delta) = self.decode_line(line.trim()) {
                deltas.push(delta);
            }
        }
        deltas
    }

    /// Flush any trailing line left in the buffer at end of transport
    pub fn finish(&mut self) -> Vec<String> {
        let rest = std::mem::take(&mut self.buffer);
        let mut deltas = Vec::new();
        if !self.done {
            let rest = String::from_utf8_lossy(&rest);
            if let Some(delta) = self.decode_line(rest.trim()) {
                deltas.push(delta);
            }
        }
        self.done = true;
        deltas
    }

    fn decode_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            return None;
        }

        match self.framing {
            StreamFraming::Sse => {
                let data = line.strip_prefix("data:")?.trim();
                if data == "[DONE]" {
                    self.done = true;
                    return None;
                }
                let parsed: SseDelta = serde_json::from_str(data).ok()?;
                let mut text = String::new();
                for choice in parsed.choices {
                    if let Some(content) = choice.delta.content {
                        text.push_str(&content);
                    }
                }
                (!text.is_empty()).then_some(text)
            }
            StreamFraming::Ndjson => {
                let parsed: NdjsonDelta = serde_json::from_str(line).ok()?;
                if parsed.done {
                    self.done = true;
                }
                let text = parsed
                    .message
                    .and_then(|m| m.content)
                    .unwrap_or_default();
                (!text.is_empty()).then_some(text)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sse_line(content: &str) -> String {
        format!(
            "data: {{\"choices\":[{{\"delta\":{{\"content\":\"{content}\"}}}}]}}\n"
        )
    }

    #[test]
    fn test_sse_deltas_then_done() {
        let mut decoder = DeltaDecoder::new(StreamFraming::Sse);
        let mut out = decoder.feed(sse_line("Hel").as_bytes());
        out.extend(decoder.feed(sse_line("lo").as_bytes()));
        out.extend(decoder.feed(b"data: [DONE]\n"));

        assert_eq!(out, vec!["Hel".to_string(), "lo".to_string()]);
        assert!(decoder.is_done());
    }

    #[test]
    fn test_sse_lines_after_done_are_discarded() {
        let mut decoder = DeltaDecoder::new(StreamFraming::Sse);
        let input = format!("data: [DONE]\n{}", sse_line("late"));
        assert!(decoder.feed(input.as_bytes()).is_empty());
    }

    #[test]
    fn test_sse_malformed_line_is_skipped() {
        let mut decoder = DeltaDecoder::new(StreamFraming::Sse);
        let input = format!("data: {{not json\n{}", sse_line("ok"));
        assert_eq!(decoder.feed(input.as_bytes()), vec!["ok".to_string()]);
        assert!(!decoder.is_done());
    }

    #[test]
    fn test_sse_non_data_lines_are_ignored() {
        let mut decoder = DeltaDecoder::new(StreamFraming::Sse);
        let input = format!(": comment\nevent: ping\n\n{}", sse_line("hi"));
        assert_eq!(decoder.feed(input.as_bytes()), vec!["hi".to_string()]);
    }

    #[test]
    fn test_sse_chunk_split_mid_line() {
        let mut decoder = DeltaDecoder::new(StreamFraming::Sse);
        let line = sse_line("split");
        let (a, b) = line.split_at(10);
        assert!(decoder.feed(a.as_bytes()).is_empty());
        assert_eq!(decoder.feed(b.as_bytes()), vec!["split".to_string()]);
    }

    #[test]
    fn test_ndjson_deltas_and_done_flag() {
        let mut decoder = DeltaDecoder::new(StreamFraming::Ndjson);
        let out = decoder.feed(
            b"{\"message\":{\"content\":\"Hel\"},\"done\":false}\n\
              {\"message\":{\"content\":\"lo\"},\"done\":false}\n\
              {\"message\":{\"content\":\"\"},\"done\":true}\n",
        );
        assert_eq!(out, vec!["Hel".to_string(), "lo".to_string()]);
        assert!(decoder.is_done());
    }

    #[test]
    fn test_ndjson_empty_fragments_filtered() {
        let mut decoder = DeltaDecoder::new(StreamFraming::Ndjson);
        let out = decoder.feed(b"{\"message\":{\"content\":\"\"},\"done\":false}\n");
        assert!(out.is_empty());
        assert!(!decoder.is_done());
    }

    #[test]
    fn test_ndjson_multibyte_char_split_across_chunks() {
        let mut decoder = DeltaDecoder::new(StreamFraming::Ndjson);
        let line = "{\"message\":{\"content\":\"caf\u{e9}\"},\"done\":false}\n".as_bytes();
        // Split between the two bytes of the UTF-8 encoding of 'é'
        let pos = line.iter().position(|&b| b == 0xC3).unwrap() + 1;
        assert!(decoder.feed(&line[..pos]).is_empty());
        assert_eq!(decoder.feed(&line[pos..]), vec!["caf\u{e9}".to_string()]);
    }

    #[test]
    fn test_sse_multibyte_char_split_across_chunks() {
        let mut decoder = DeltaDecoder::new(StreamFraming::Sse);
        let line = sse_line("na\u{ef}ve");
        let bytes = line.as_bytes();
        let pos = bytes.iter().position(|&b| b == 0xC3).unwrap() + 1;
        assert!(decoder.feed(&bytes[..pos]).is_empty());
        assert_eq!(decoder.feed(&bytes[pos..]), vec!["na\u{ef}ve".to_string()]);
    }

    #[test]
    fn test_finish_flushes_trailing_line() {
        let mut decoder = DeltaDecoder::new(StreamFraming::Ndjson);
        // no trailing newline on the last record
        assert!(decoder
            .feed(b"{\"message\":{\"content\":\"tail\"},\"done\":true}")
            .is_empty());
        assert_eq!(decoder.finish(), vec!["tail".to_string()]);
        assert!(decoder.is_done());
    }
}
