//! Turns the backend's newline-delimited JSON body into text deltas.
//!
//! Upstream chunk boundaries carry no meaning: a chunk may hold several records,
//! part of one, or split a UTF-8 sequence. Bytes are buffered until a `\n`
//! arrives, and whatever is left when the body ends is decoded as a final line.
//! An unterminated line may not grow past `RelayOptions::max_line_bytes`.

use async_stream::try_stream;
use bytes::BytesMut;
use futures::{Stream, StreamExt};
use serde::Serialize;
use serde_json::Value;

use crate::llm_client::{ByteStream, LlmError};

/// What to do with an upstream line that is not a JSON object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LinePolicy {
    /// Forward the raw trimmed line as text.
    #[default]
    Lenient,
    /// End the stream with `LlmError::MalformedLine`.
    Strict,
}

impl LinePolicy {
    pub fn from_strict_flag(strict: bool) -> Self {
        if strict {
            LinePolicy::Strict
        } else {
            LinePolicy::Lenient
        }
    }
}

/// Upper bound for a single upstream line unless configured otherwise.
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// Per-session reframing settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayOptions {
    pub policy: LinePolicy,
    pub max_line_bytes: usize,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            policy: LinePolicy::Lenient,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

/// One unit of generated text, in upstream arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeltaEvent {
    pub content: String,
}

impl DeltaEvent {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// Line-buffering decoder for one relay session. Not shared, not reused.
#[derive(Debug, Default)]
pub struct Reframer {
    buffer: BytesMut,
    options: RelayOptions,
}

impl Reframer {
    pub fn new(options: RelayOptions) -> Self {
        Self {
            buffer: BytesMut::new(),
            options,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Pops complete lines until one yields an event. `None` means the
    /// remaining buffer holds no newline yet. An unterminated tail longer than
    /// the line limit is discarded and reported as a stream error.
    pub fn next_event(&mut self) -> Option<Result<DeltaEvent, LlmError>> {
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line = self.buffer.split_to(pos + 1);
            if let Some(event) = self.decode_line(&line).transpose() {
                return Some(event);
            }
        }

        let pending = self.buffered_len();
        if pending > self.options.max_line_bytes {
            self.buffer.clear();
            return Some(Err(LlmError::Stream(format!(
                "line exceeded {} bytes without a newline ({pending} buffered)",
                self.options.max_line_bytes
            ))));
        }
        None
    }

    /// Decodes the unterminated tail left after the body ended.
    pub fn finish(&mut self) -> Option<Result<DeltaEvent, LlmError>> {
        let rest = self.buffer.split();
        self.decode_line(&rest).transpose()
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    fn decode_line(&self, raw: &[u8]) -> Result<Option<DeltaEvent>, LlmError> {
        let text = String::from_utf8_lossy(raw);
        let line = text.trim();
        if line.is_empty() {
            return Ok(None);
        }

        match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(record)) => {
                if let Some(response) = record.get("response") {
                    return Ok(match response {
                        Value::Null => None,
                        Value::String(s) => Some(DeltaEvent::new(s.as_str())),
                        other => Some(DeltaEvent::new(other.to_string())),
                    });
                }
                if let Some(error) = record.get("error") {
                    let message = error
                        .as_str()
                        .map(str::to_string)
                        .unwrap_or_else(|| error.to_string());
                    return Err(LlmError::Backend(message));
                }
                // metadata-only record
                Ok(None)
            }
            _ => match self.options.policy {
                LinePolicy::Lenient => Ok(Some(DeltaEvent::new(line))),
                LinePolicy::Strict => Err(LlmError::MalformedLine(line.to_string())),
            },
        }
    }
}

/// Wraps an upstream body into an ordered stream of deltas. The stream ends
/// after the first error; dropping it drops (and so closes) the upstream.
pub fn reframe(
    upstream: ByteStream,
    options: RelayOptions,
) -> impl Stream<Item = Result<DeltaEvent, LlmError>> + Send + 'static {
    try_stream! {
        let mut upstream = upstream;
        let mut reframer = Reframer::new(options);

        while let Some(chunk) = upstream.next().await {
            reframer.push(&chunk?);
            while let Some(event) = reframer.next_event() {
                yield event?;
            }
        }

        if let Some(event) = reframer.finish() {
            yield event?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn upstream(chunks: Vec<Vec<u8>>) -> ByteStream {
        futures::stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from(c)))).boxed()
    }

    fn options(policy: LinePolicy) -> RelayOptions {
        RelayOptions {
            policy,
            ..RelayOptions::default()
        }
    }

    async fn collect(chunks: Vec<Vec<u8>>, policy: LinePolicy) -> Vec<Result<DeltaEvent, LlmError>> {
        reframe(upstream(chunks), options(policy)).collect().await
    }

    async fn contents(chunks: Vec<Vec<u8>>) -> Vec<String> {
        collect(chunks, LinePolicy::Lenient)
            .await
            .into_iter()
            .map(|r| r.unwrap().content)
            .collect()
    }

    const BODY: &str = "{\"response\":\"Senior \"}\n{\"response\":\"Engin\u{e9}er\"}\n{\"response\":\"\u{1f680}\",\"done\":false}\n";

    fn expected() -> Vec<String> {
        vec![
            "Senior ".to_string(),
            "Engin\u{e9}er".to_string(),
            "\u{1f680}".to_string(),
        ]
    }

    #[tokio::test]
    async fn test_every_two_way_split_yields_same_deltas() {
        let body = BODY.as_bytes();
        for split in 0..=body.len() {
            let chunks = vec![body[..split].to_vec(), body[split..].to_vec()];
            assert_eq!(contents(chunks).await, expected(), "split at byte {split}");
        }
    }

    #[tokio::test]
    async fn test_one_byte_at_a_time() {
        let chunks = BODY.bytes().map(|b| vec![b]).collect();
        assert_eq!(contents(chunks).await, expected());
    }

    #[tokio::test]
    async fn test_many_records_in_one_chunk_and_empty_chunks() {
        let chunks = vec![Vec::new(), BODY.as_bytes().to_vec(), Vec::new()];
        assert_eq!(contents(chunks).await, expected());
    }

    #[tokio::test]
    async fn test_invalid_json_falls_back_to_raw_line() {
        let chunks = vec![b"  not json at all  \n{\"response\":\"ok\"}\n".to_vec()];
        assert_eq!(contents(chunks).await, vec!["not json at all", "ok"]);
    }

    #[tokio::test]
    async fn test_non_object_json_falls_back_to_raw_line() {
        let chunks = vec![b"[\"x\"]\n42\n".to_vec()];
        assert_eq!(contents(chunks).await, vec!["[\"x\"]", "42"]);
    }

    #[tokio::test]
    async fn test_trailing_partial_line_is_flushed() {
        let chunks = vec![b"{\"response\":\"a\"}\n{\"response\":".to_vec(), b"\"b\"}".to_vec()];
        assert_eq!(contents(chunks).await, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_trailing_garbage_is_flushed_raw() {
        let chunks = vec![b"{\"response\":\"a\"}\n{\"respo".to_vec()];
        assert_eq!(contents(chunks).await, vec!["a", "{\"respo"]);
    }

    #[tokio::test]
    async fn test_blank_and_metadata_lines_are_skipped() {
        let chunks = vec![
            b"\n   \r\n{\"response\":\"a\"}\r\n{\"done\":true,\"total_duration\":12}\n".to_vec(),
        ];
        assert_eq!(contents(chunks).await, vec!["a"]);
    }

    #[tokio::test]
    async fn test_empty_response_still_emits() {
        let chunks = vec![b"{\"response\":\"\",\"done\":true}\n".to_vec()];
        assert_eq!(contents(chunks).await, vec![""]);
    }

    #[tokio::test]
    async fn test_strict_policy_stops_at_malformed_line() {
        let chunks = vec![b"{\"response\":\"a\"}\nbroken\n{\"response\":\"b\"}\n".to_vec()];
        let events = collect(chunks, LinePolicy::Strict).await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].as_ref().unwrap().content, "a");
        assert!(matches!(&events[1], Err(LlmError::MalformedLine(l)) if l == "broken"));
    }

    #[tokio::test]
    async fn test_backend_error_record_ends_stream() {
        let chunks = vec![
            b"{\"response\":\"a\"}\n{\"error\":\"out of memory\"}\n{\"response\":\"b\"}\n".to_vec(),
        ];
        let events = collect(chunks, LinePolicy::Lenient).await;
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[1], Err(LlmError::Backend(m)) if m == "out of memory"));
    }

    #[tokio::test]
    async fn test_read_error_ends_stream_after_buffered_deltas() {
        let items: Vec<Result<Bytes, LlmError>> = vec![
            Ok(Bytes::from_static(b"{\"response\":\"a\"}\n{\"response\":\"b\"}\n")),
            Err(LlmError::Stream("connection reset".to_string())),
            Ok(Bytes::from_static(b"{\"response\":\"c\"}\n")),
        ];
        let events: Vec<_> = reframe(futures::stream::iter(items).boxed(), RelayOptions::default())
            .collect()
            .await;
        assert_eq!(events.len(), 3);
        assert_eq!(events[1].as_ref().unwrap().content, "b");
        assert!(matches!(&events[2], Err(LlmError::Stream(_))));
    }

    #[test]
    fn test_reframer_keeps_partial_line_buffered() {
        let mut reframer = Reframer::new(RelayOptions::default());
        reframer.push(b"{\"response\":\"par");
        assert!(reframer.next_event().is_none());
        assert_eq!(reframer.buffered_len(), 16);
        reframer.push(b"tial\"}\n");
        assert_eq!(reframer.next_event().unwrap().unwrap().content, "partial");
        assert_eq!(reframer.buffered_len(), 0);
        assert!(reframer.finish().is_none());
    }

    #[tokio::test]
    async fn test_unterminated_line_over_limit_ends_stream() {
        let opts = RelayOptions {
            max_line_bytes: 32,
            ..RelayOptions::default()
        };
        let chunks = vec![
            b"{\"response\":\"a\"}\n".to_vec(),
            vec![b'x'; 20],
            vec![b'x'; 20],
            b"\n{\"response\":\"b\"}\n".to_vec(),
        ];
        let events: Vec<_> = reframe(upstream(chunks), opts).collect().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].as_ref().unwrap().content, "a");
        assert!(matches!(&events[1], Err(LlmError::Stream(m)) if m.contains("32 bytes")));
    }

    #[test]
    fn test_line_at_limit_is_kept() {
        let mut reframer = Reframer::new(RelayOptions {
            max_line_bytes: 8,
            ..RelayOptions::default()
        });
        reframer.push(b"12345678");
        assert!(reframer.next_event().is_none());
        reframer.push(b"\n");
        assert_eq!(reframer.next_event().unwrap().unwrap().content, "12345678");
    }

    #[test]
    fn test_policy_from_flag() {
        assert_eq!(LinePolicy::from_strict_flag(true), LinePolicy::Strict);
        assert_eq!(LinePolicy::from_strict_flag(false), LinePolicy::Lenient);
    }
}
