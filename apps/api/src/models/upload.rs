use serde::Serialize;

use crate::session::ResumeContext;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub message: String,
    pub file_type: String,
    pub content_length: usize,
    pub truncated: bool,
}

impl UploadResponse {
    pub fn stored(context: &ResumeContext) -> Self {
        Self {
            success: true,
            message: "Resume processed successfully".to_string(),
            file_type: context.file_type.clone(),
            content_length: context.content_length,
            truncated: context.truncated,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ResumeStatusResponse {
    pub has_resume: bool,
    #[serde(flatten)]
    pub resume: Option<ResumeContext>,
}
