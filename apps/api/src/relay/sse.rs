//! Server-push framing for relay sessions.
//!
//! Every session is `data: {"content":…}` frames followed by exactly one
//! terminal frame, either `data: [DONE]` or `data: {"error":…}`. Each frame is a
//! separate body chunk so the transport flushes it as soon as it is produced.

use std::convert::Infallible;

use async_stream::stream;
use axum::{
    body::Body,
    http::{
        header::{CACHE_CONTROL, CONTENT_TYPE},
        HeaderName,
    },
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::llm_client::{ByteStream, LlmError};
use crate::relay::reframer::{reframe, DeltaEvent, RelayOptions};

const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");
pub const DONE_MARKER: &str = "[DONE]";

/// The event that closes a relay session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalEvent {
    Done,
    Error { message: String },
}

impl TerminalEvent {
    pub fn error(err: &LlmError) -> Self {
        TerminalEvent::Error {
            message: err.to_string(),
        }
    }

    pub fn to_frame(&self) -> Bytes {
        match self {
            TerminalEvent::Done => frame(DONE_MARKER),
            TerminalEvent::Error { message } => frame(&json!({ "error": message }).to_string()),
        }
    }
}

pub fn delta_frame(delta: &DeltaEvent) -> Bytes {
    frame(&json!({ "content": delta.content }).to_string())
}

fn frame(payload: &str) -> Bytes {
    Bytes::from(format!("data: {payload}\n\n"))
}

/// Produces the frames of one relay session.
///
/// `upstream` is the result of opening the backend stream; a failed open
/// becomes the single error frame. Dropping the returned stream drops the
/// reframer and the upstream body with it, which is how a client disconnect
/// aborts the backend read.
pub fn relay_frames(
    upstream: Result<ByteStream, LlmError>,
    options: RelayOptions,
) -> impl Stream<Item = Bytes> + Send + 'static {
    stream! {
        let relay_id = Uuid::new_v4();

        let upstream = match upstream {
            Ok(upstream) => upstream,
            Err(e) => {
                warn!("Relay {relay_id}: upstream unavailable: {e}");
                yield TerminalEvent::error(&e).to_frame();
                return;
            }
        };

        info!("Relay {relay_id}: streaming started");

        let deltas = reframe(upstream, options);
        futures::pin_mut!(deltas);

        let mut delta_count = 0usize;
        while let Some(item) = deltas.next().await {
            match item {
                Ok(delta) => {
                    delta_count += 1;
                    yield delta_frame(&delta);
                }
                Err(e) => {
                    warn!("Relay {relay_id}: upstream failed after {delta_count} deltas: {e}");
                    yield TerminalEvent::error(&e).to_frame();
                    return;
                }
            }
        }

        info!("Relay {relay_id}: completed with {delta_count} deltas");
        yield TerminalEvent::Done.to_frame();
    }
}

/// Wraps a frame stream into a `text/event-stream` response with caching and
/// proxy buffering disabled.
pub fn event_stream_response<S>(frames: S) -> Response
where
    S: Stream<Item = Bytes> + Send + 'static,
{
    let body = Body::from_stream(frames.map(Ok::<_, Infallible>));
    (
        [
            (CONTENT_TYPE, "text/event-stream"),
            (CACHE_CONTROL, "no-cache"),
            (X_ACCEL_BUFFERING, "no"),
        ],
        body,
    )
        .into_response()
}
