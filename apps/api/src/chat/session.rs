//! Client-side consumption of a relay stream.
//!
//! `FrameDecoder` turns response body bytes back into frames, and
//! `ChatSession` folds those frames into a transcript the way the browser UI
//! does: one growing assistant message per prompt.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::relay::sse::DONE_MARKER;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayFrame {
    Delta(String),
    Done,
    Error(String),
}

impl RelayFrame {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RelayFrame::Done | RelayFrame::Error(_))
    }
}

#[derive(Debug, Deserialize)]
struct FramePayload {
    content: Option<String>,
    error: Option<String>,
}

/// Splits a relay body into frames; frames may straddle reads.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<RelayFrame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.windows(2).position(|w| w == b"\n\n") {
            let raw: Vec<u8> = self.buffer.drain(..pos + 2).collect();
            frames.extend(parse_frame(&raw));
        }
        frames
    }

    /// Parses whatever is left once the body has ended.
    pub fn finish(&mut self) -> Vec<RelayFrame> {
        let raw = std::mem::take(&mut self.buffer);
        parse_frame(&raw).into_iter().collect()
    }
}

fn parse_frame(raw: &[u8]) -> Option<RelayFrame> {
    let text = String::from_utf8_lossy(raw);
    text.lines().find_map(|line| {
        let payload = line.strip_prefix("data:")?.trim_start();
        if payload == DONE_MARKER {
            return Some(RelayFrame::Done);
        }
        // Unparseable frames are ignored, as the browser does.
        let parsed: FramePayload = serde_json::from_str(payload).ok()?;
        match (parsed.error, parsed.content) {
            (Some(error), _) => Some(RelayFrame::Error(error)),
            (None, Some(content)) => Some(RelayFrame::Delta(content)),
            (None, None) => None,
        }
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyState {
    Idle,
    Streaming,
    Complete,
    Failed(String),
}

#[derive(Debug)]
pub struct ChatSession {
    messages: Vec<ChatMessage>,
    state: ReplyState,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            state: ReplyState::Idle,
        }
    }
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn state(&self) -> &ReplyState {
        &self.state
    }

    pub fn is_streaming(&self) -> bool {
        self.state == ReplyState::Streaming
    }

    /// Text of the latest assistant message.
    pub fn last_reply(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.content.as_str())
    }

    /// Records the user's prompt and opens an empty assistant reply.
    /// Refused while a reply is still streaming.
    pub fn begin(&mut self, prompt: &str) -> bool {
        if self.is_streaming() {
            return false;
        }
        self.messages.push(ChatMessage {
            role: Role::User,
            content: prompt.to_string(),
        });
        self.messages.push(ChatMessage {
            role: Role::Assistant,
            content: String::new(),
        });
        self.state = ReplyState::Streaming;
        true
    }

    /// Folds one frame into the open reply. Returns false when the frame was
    /// ignored because no reply is streaming.
    pub fn apply(&mut self, frame: RelayFrame) -> bool {
        if !self.is_streaming() {
            return false;
        }
        let Some(reply) = self.messages.last_mut() else {
            return false;
        };

        match frame {
            RelayFrame::Delta(content) => reply.content.push_str(&content),
            RelayFrame::Done => self.state = ReplyState::Complete,
            RelayFrame::Error(message) => {
                if reply.content.is_empty() {
                    reply.content = format!("Error generating response: {message}");
                }
                self.state = ReplyState::Failed(message);
            }
        }
        true
    }

    /// Drives a whole relay body into the session. A body that ends without
    /// a terminal frame counts as a failure.
    pub async fn consume<S, E>(&mut self, body: S) -> &ReplyState
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: std::fmt::Display,
    {
        let mut decoder = FrameDecoder::new();
        futures::pin_mut!(body);

        while let Some(chunk) = body.next().await {
            let frames = match chunk {
                Ok(bytes) => decoder.push(&bytes),
                Err(e) => vec![RelayFrame::Error(e.to_string())],
            };
            for frame in frames {
                self.apply(frame);
            }
            if !self.is_streaming() {
                return &self.state;
            }
        }

        for frame in decoder.finish() {
            self.apply(frame);
        }
        if self.is_streaming() {
            self.apply(RelayFrame::Error("stream ended unexpectedly".to_string()));
        }
        &self.state
    }
}
