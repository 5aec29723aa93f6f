//! Axum route handlers for the resume-grounded chat.

use std::io::Write;

use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    response::Response,
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use tracing::info;

use crate::chat::handlers::relay_prompt;
use crate::errors::AppError;
use crate::llm_client::prompts::build_prompt;
use crate::models::{PromptRequest, ResumeStatusResponse, UploadResponse};
use crate::resume::detect::{detect_document_type, DocumentType};
use crate::resume::extract::{
    apply_budget, BudgetedText, DocumentExtractor, ExtractError, ExtractionBudget,
};
use crate::session::{ensure_session, session_id, ResumeContext};
use crate::state::AppState;

const RESUME_FIELD: &str = "resume";
const ALLOWED_TYPES_MESSAGE: &str = "Only PDF, DOC, DOCX, and TXT files are allowed.";

struct UploadedFile {
    bytes: Vec<u8>,
    file_name: Option<String>,
    content_type: Option<String>,
}

/// POST /resume/upload
///
/// Accepts a multipart `resume` file, extracts its text within the configured
/// budget and stores it as this session's context, replacing any earlier one.
/// Nothing is stored unless every step succeeds.
pub async fn handle_upload(
    State(state): State<AppState>,
    jar: CookieJar,
    mut multipart: Multipart,
) -> Result<(CookieJar, Json<UploadResponse>), AppError> {
    let limit = state.config.max_upload_bytes;
    let upload = read_resume_field(&mut multipart, limit).await?;

    let kind = detect_document_type(
        &upload.bytes,
        upload.content_type.as_deref(),
        upload.file_name.as_deref(),
    )
    .ok_or_else(|| AppError::InvalidUpload(ALLOWED_TYPES_MESSAGE.to_string()))?;

    let extractor = state.extractor.clone();
    let budget = state.extraction_budget();
    let BudgetedText { text, truncated } = tokio::task::spawn_blocking(move || {
        extract_upload(extractor.as_ref(), &upload.bytes, kind, budget)
    })
    .await
    .map_err(|e| AppError::Internal(e.into()))??;

    let context = ResumeContext {
        content_length: text.chars().count(),
        text,
        file_type: kind.mime().to_string(),
        truncated,
        uploaded_at: Utc::now(),
    };

    let (jar, session) = ensure_session(jar);
    let response = UploadResponse::stored(&context);
    let replaced = state.sessions.put(session, context).is_some();

    info!(
        "Stored resume for session {session}: {} ({} chars, truncated: {truncated}, replaced: {replaced})",
        response.file_type, response.content_length
    );

    Ok((jar, Json(response)))
}

/// POST /resume/generate
///
/// Streams an answer grounded in the session's uploaded resume. Fails with 400
/// before contacting the backend when the session has no resume.
pub async fn handle_generate(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(request): Json<PromptRequest>,
) -> Result<Response, AppError> {
    let context = session_id(&jar)
        .and_then(|id| state.sessions.get(id))
        .filter(|c| !c.text.trim().is_empty())
        .ok_or(AppError::MissingContext)?;

    let prompt = request.validated_prompt()?;
    let full_prompt = build_prompt(prompt, Some(&context.text));
    Ok(relay_prompt(&state, &full_prompt, request.model.as_deref()).await)
}

/// GET /resume/status
pub async fn handle_status(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Json<ResumeStatusResponse> {
    let resume = session_id(&jar).and_then(|id| state.sessions.get(id));
    Json(ResumeStatusResponse {
        has_resume: resume.is_some(),
        resume,
    })
}

/// DELETE /resume
pub async fn handle_clear(State(state): State<AppState>, jar: CookieJar) -> StatusCode {
    if let Some(id) = session_id(&jar) {
        if state.sessions.remove(id) {
            info!("Cleared resume for session {id}");
        }
    }
    StatusCode::NO_CONTENT
}

async fn read_resume_field(multipart: &mut Multipart, limit: usize) -> Result<UploadedFile, AppError> {
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        if field.name() != Some(RESUME_FIELD) {
            continue;
        }

        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let mut bytes = Vec::new();
        while let Some(chunk) = field.chunk().await.map_err(|e| multipart_error(e, limit))? {
            if bytes.len() + chunk.len() > limit {
                return Err(AppError::UploadTooLarge { limit });
            }
            bytes.extend_from_slice(&chunk);
        }

        return Ok(UploadedFile {
            bytes,
            file_name,
            content_type,
        });
    }

    Err(AppError::InvalidUpload(format!(
        "The {RESUME_FIELD} file is required."
    )))
}

fn multipart_error(err: MultipartError, limit: usize) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::UploadTooLarge { limit }
    } else {
        AppError::InvalidUpload(err.body_text())
    }
}

/// Stages the upload in a temp file for the extractor and applies the budget.
/// Blocking; run it off the async workers.
fn extract_upload(
    extractor: &dyn DocumentExtractor,
    bytes: &[u8],
    kind: DocumentType,
    budget: ExtractionBudget,
) -> Result<BudgetedText, AppError> {
    let mut staged = tempfile::Builder::new()
        .prefix("resume-")
        .suffix(&format!(".{}", kind.extension()))
        .tempfile()
        .map_err(|e| AppError::Internal(e.into()))?;
    staged
        .write_all(bytes)
        .and_then(|_| staged.flush())
        .map_err(|e| AppError::Internal(e.into()))?;

    let document = extractor.extract(staged.path(), kind)?;
    let budgeted = apply_budget(document, budget);
    if budgeted.text.trim().is_empty() {
        return Err(ExtractError::Empty.into());
    }
    Ok(budgeted)
}
