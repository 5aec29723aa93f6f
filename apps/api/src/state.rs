use std::sync::Arc;

use crate::config::Config;
use crate::llm_client::InferenceBackend;
use crate::relay::{LinePolicy, RelayOptions};
use crate::resume::extract::{DocumentExtractor, ExtractionBudget};
use crate::session::SessionStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Inference server. Default: `OllamaClient`; tests swap in a scripted backend.
    pub backend: Arc<dyn InferenceBackend>,
    pub extractor: Arc<dyn DocumentExtractor>,
    pub sessions: SessionStore,
    pub config: Config,
}

impl AppState {
    /// The model a request should run against: its own choice if non-blank,
    /// otherwise the configured default.
    pub fn model_for<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        requested
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(self.config.ollama_model.as_str())
    }

    pub fn relay_options(&self) -> RelayOptions {
        RelayOptions {
            policy: LinePolicy::from_strict_flag(self.config.relay_strict_lines),
            max_line_bytes: self.config.relay_max_line_bytes,
        }
    }

    pub fn extraction_budget(&self) -> ExtractionBudget {
        ExtractionBudget {
            max_units: self.config.resume_page_limit,
            max_chars: self.config.resume_char_limit,
        }
    }
}
