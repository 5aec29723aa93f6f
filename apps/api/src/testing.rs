//! Test doubles shared by handler and relay tests.

use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};

use crate::llm_client::{ByteStream, InferenceBackend, LlmError};

/// Upstream body wrapper that counts how often it is closed (dropped).
pub struct TrackedStream {
    inner: ByteStream,
    closes: Arc<AtomicUsize>,
}

impl TrackedStream {
    pub fn new(inner: ByteStream, closes: Arc<AtomicUsize>) -> Self {
        Self { inner, closes }
    }
}

impl Stream for TrackedStream {
    type Item = Result<Bytes, LlmError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl Drop for TrackedStream {
    fn drop(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Backend that replays fixed chunks and records what it was asked.
#[derive(Default)]
pub struct ScriptedBackend {
    pub chunks: Vec<&'static str>,
    pub fail_status: Option<u16>,
    /// Keep the stream open after the last chunk instead of ending it.
    pub hang_after_chunks: bool,
    pub reply: String,
    pub opens: Arc<AtomicUsize>,
    pub closes: Arc<AtomicUsize>,
    pub requests: Mutex<Vec<(String, String)>>,
}

impl ScriptedBackend {
    pub fn streaming(chunks: Vec<&'static str>) -> Self {
        Self {
            chunks,
            ..Default::default()
        }
    }

    pub fn failing(status: u16) -> Self {
        Self {
            fail_status: Some(status),
            ..Default::default()
        }
    }

    pub fn last_request(&self) -> Option<(String, String)> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl InferenceBackend for ScriptedBackend {
    async fn open_stream(&self, prompt: &str, model: &str) -> Result<ByteStream, LlmError> {
        self.requests
            .lock()
            .unwrap()
            .push((prompt.to_string(), model.to_string()));

        if let Some(status) = self.fail_status {
            return Err(LlmError::Api {
                status,
                message: "Internal Server Error".to_string(),
            });
        }

        self.opens.fetch_add(1, Ordering::SeqCst);
        let items: Vec<Result<Bytes, LlmError>> = self
            .chunks
            .iter()
            .map(|c| Ok(Bytes::from_static(c.as_bytes())))
            .collect();
        let replay = futures::stream::iter(items);
        let inner = if self.hang_after_chunks {
            replay.chain(futures::stream::pending()).boxed()
        } else {
            replay.boxed()
        };

        Ok(TrackedStream::new(inner, self.closes.clone()).boxed())
    }

    async fn generate(&self, prompt: &str, model: &str) -> Result<String, LlmError> {
        self.requests
            .lock()
            .unwrap()
            .push((prompt.to_string(), model.to_string()));

        match self.fail_status {
            Some(status) => Err(LlmError::Api {
                status,
                message: "Internal Server Error".to_string(),
            }),
            None => Ok(self.reply.clone()),
        }
    }
}
