//! Axum route handlers for free-form chat.

use axum::{extract::State, response::Response, Json};
use tracing::info;

use crate::errors::AppError;
use crate::llm_client::prompts::build_prompt;
use crate::models::{CompleteResponse, PromptRequest};
use crate::relay::{event_stream_response, relay_frames};
use crate::state::AppState;

/// Opens the upstream stream for `prompt` and relays it as an event stream.
/// An upstream that cannot be opened becomes the stream's single error frame.
pub(crate) async fn relay_prompt(state: &AppState, prompt: &str, model: Option<&str>) -> Response {
    let model = state.model_for(model);
    info!(
        "Opening relay (model: {model}, prompt: {} chars)",
        prompt.chars().count()
    );
    let upstream = state.backend.open_stream(prompt, model).await;
    event_stream_response(relay_frames(upstream, state.relay_options()))
}

/// POST /chat/generate
///
/// Streams the model's answer as `data:` frames terminated by `[DONE]` or an
/// error frame. Inline `context`, when given, grounds the prompt.
pub async fn handle_generate(
    State(state): State<AppState>,
    Json(request): Json<PromptRequest>,
) -> Result<Response, AppError> {
    let prompt = request.validated_prompt()?;
    let full_prompt = build_prompt(prompt, request.context.as_deref());
    Ok(relay_prompt(&state, &full_prompt, request.model.as_deref()).await)
}

/// POST /chat/complete
///
/// Non-streaming variant: waits for the whole answer and returns it as JSON.
pub async fn handle_complete(
    State(state): State<AppState>,
    Json(request): Json<PromptRequest>,
) -> Result<Json<CompleteResponse>, AppError> {
    let prompt = request.validated_prompt()?;
    let full_prompt = build_prompt(prompt, request.context.as_deref());
    let model = state.model_for(request.model.as_deref());

    let response = state.backend.generate(&full_prompt, model).await?;

    Ok(Json(CompleteResponse { response }))
}
