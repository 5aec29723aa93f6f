use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// Body of the chat and resume generation endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct PromptRequest {
    #[serde(default)]
    pub prompt: String,
    /// Grounding text supplied inline. Resume endpoints use the session's
    /// uploaded resume instead.
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

impl PromptRequest {
    /// The prompt, or a validation error when it is blank.
    pub fn validated_prompt(&self) -> Result<&str, AppError> {
        if self.prompt.trim().is_empty() {
            return Err(AppError::Validation("prompt cannot be empty".to_string()));
        }
        Ok(&self.prompt)
    }
}

#[derive(Debug, Serialize)]
pub struct CompleteResponse {
    pub response: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_prompt_rejected() {
        let req: PromptRequest = serde_json::from_str(r#"{"prompt": "  \n "}"#).unwrap();
        assert!(matches!(req.validated_prompt(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_missing_prompt_rejected() {
        let req: PromptRequest = serde_json::from_str("{}").unwrap();
        assert!(req.validated_prompt().is_err());
    }

    #[test]
    fn test_optional_fields() {
        let req: PromptRequest =
            serde_json::from_str(r#"{"prompt": "hi", "context": "cv", "model": "mistral"}"#).unwrap();
        assert_eq!(req.validated_prompt().unwrap(), "hi");
        assert_eq!(req.context.as_deref(), Some("cv"));
        assert_eq!(req.model.as_deref(), Some("mistral"));
    }
}
