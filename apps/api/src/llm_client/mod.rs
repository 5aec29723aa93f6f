/// LLM Client — the single point of entry for all inference backend calls.
///
/// No other module talks to the backend over HTTP. Handlers depend on the
/// `InferenceBackend` trait so the relay can be driven by a scripted backend
/// in tests.
///
/// Backend protocol: `POST {base}/api/generate` with `{model, prompt, stream}`.
/// Streaming responses are newline-delimited JSON records; decoding them is the
/// reframer's job, this module only hands out the raw byte stream.
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub mod prompts;

/// Model used when neither the request nor the configuration names one.
pub const DEFAULT_MODEL: &str = "llama2";
const GENERATE_PATH: &str = "/api/generate";
const CONNECT_TIMEOUT_SECS: u64 = 10;
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Raw upstream body. Dropping it closes the upstream connection.
pub type ByteStream = BoxStream<'static, Result<Bytes, LlmError>>;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backend returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Upstream stream failed: {0}")]
    Stream(String),

    #[error("Backend reported an error: {0}")]
    Backend(String),

    #[error("Malformed upstream line: {0}")]
    MalformedLine(String),

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Backend returned empty content")]
    EmptyContent,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaErrorBody {
    error: String,
}

/// Seam between the HTTP handlers and the inference server.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Opens a streaming generation. Connection failures and non-success
    /// statuses are reported here, before any body bytes are handed out.
    async fn open_stream(&self, prompt: &str, model: &str) -> Result<ByteStream, LlmError>;

    /// Single-shot generation returning the complete `response` text.
    async fn generate(&self, prompt: &str, model: &str) -> Result<String, LlmError>;
}

/// Client for an Ollama-compatible inference server.
#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, LlmError> {
        // No overall request timeout: a generation may legitimately run for minutes.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post_generate(&self, body: &GenerateRequest<'_>) -> Result<Response, LlmError> {
        let url = format!("{}{GENERATE_PATH}", self.base_url);
        let response = self.client.post(&url).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<OllamaErrorBody>(&raw)
                .map(|e| e.error)
                .unwrap_or_else(|_| truncate_chars(&raw, MAX_ERROR_BODY_CHARS));
            warn!("Inference backend returned {}: {}", status, message);
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl InferenceBackend for OllamaClient {
    async fn open_stream(&self, prompt: &str, model: &str) -> Result<ByteStream, LlmError> {
        let response = self
            .post_generate(&GenerateRequest {
                model,
                prompt,
                stream: true,
            })
            .await?;

        debug!("Upstream stream opened (model: {model})");

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| LlmError::Stream(e.to_string())))
            .boxed())
    }

    async fn generate(&self, prompt: &str, model: &str) -> Result<String, LlmError> {
        let response = self
            .post_generate(&GenerateRequest {
                model,
                prompt,
                stream: false,
            })
            .await?;

        let body: GenerateResponse = serde_json::from_slice(&response.bytes().await?)?;
        body.response.ok_or(LlmError::EmptyContent)
    }
}

fn truncate_chars(input: &str, max: usize) -> String {
    match input.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &input[..idx]),
        None => input.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_open_stream_requests_streaming_mode() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(serde_json::json!({
                "model": "llama2",
                "prompt": "hi",
                "stream": true
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("{\"response\":\"a\"}\n{\"response\":\"b\"}\n", "application/x-ndjson"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = OllamaClient::new(server.uri()).unwrap();
        let mut stream = client.open_stream("hi", "llama2").await.unwrap();

        let mut body = Vec::new();
        while let Some(chunk) = stream.next().await {
            body.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(body, b"{\"response\":\"a\"}\n{\"response\":\"b\"}\n");
    }

    #[tokio::test]
    async fn test_open_stream_fails_on_server_error_before_reading() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = OllamaClient::new(server.uri()).unwrap();
        let err = client.open_stream("hi", "llama2").await.err().unwrap();
        assert!(matches!(err, LlmError::Api { status: 500, ref message } if message == "boom"));
    }

    #[tokio::test]
    async fn test_backend_error_message_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(serde_json::json!({"error": "model 'nope' not found"})),
            )
            .mount(&server)
            .await;

        let client = OllamaClient::new(server.uri()).unwrap();
        let err = client.generate("hi", "nope").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Backend returned status 404: model 'nope' not found"
        );
    }

    #[tokio::test]
    async fn test_generate_returns_response_field() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({"stream": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "llama2",
                "response": "Hello there",
                "done": true
            })))
            .mount(&server)
            .await;

        let client = OllamaClient::new(format!("{}/", server.uri())).unwrap();
        assert_eq!(client.generate("hi", "llama2").await.unwrap(), "Hello there");
    }

    #[tokio::test]
    async fn test_generate_without_response_is_empty_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"done": true})))
            .mount(&server)
            .await;

        let client = OllamaClient::new(server.uri()).unwrap();
        let err = client.generate("hi", "llama2").await.unwrap_err();
        assert!(matches!(err, LlmError::EmptyContent));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_unavailable() {
        let client = OllamaClient::new("http://127.0.0.1:1").unwrap();
        let err = client.open_stream("hi", "llama2").await.err().unwrap();
        assert!(matches!(err, LlmError::Http(_)));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = OllamaClient::new("http://localhost:11434/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:11434");
    }

    #[test]
    fn test_truncate_chars_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé...");
        assert_eq!(truncate_chars("abc", 5), "abc");
    }
}
