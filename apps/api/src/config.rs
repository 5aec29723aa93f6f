use std::str::FromStr;

use anyhow::{Context, Result};

use crate::relay::reframer::DEFAULT_MAX_LINE_BYTES;

/// Application configuration loaded from environment variables.
/// Every variable has a default, so a bare `cargo run` talks to a local Ollama.
#[derive(Debug, Clone)]
pub struct Config {
    pub ollama_api_url: String,
    pub ollama_model: String,
    pub port: u16,
    pub rust_log: String,
    pub max_upload_bytes: usize,
    pub resume_char_limit: usize,
    pub resume_page_limit: usize,
    pub session_ttl_secs: i64,
    pub session_sweep_secs: u64,
    pub relay_strict_lines: bool,
    pub relay_max_line_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            ollama_api_url: "http://localhost:11434".to_string(),
            ollama_model: "llama2".to_string(),
            port: 8080,
            rust_log: "info".to_string(),
            max_upload_bytes: 2 * 1024 * 1024,
            resume_char_limit: 5000,
            resume_page_limit: 5,
            session_ttl_secs: 2 * 60 * 60,
            session_sweep_secs: 300,
            relay_strict_lines: false,
            relay_max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let defaults = Config::default();

        Ok(Config {
            ollama_api_url: std::env::var("OLLAMA_API_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.ollama_api_url),
            ollama_model: std::env::var("OLLAMA_MODEL").unwrap_or(defaults.ollama_model),
            port: parse_env("PORT", defaults.port)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or(defaults.rust_log),
            max_upload_bytes: parse_env("MAX_UPLOAD_BYTES", defaults.max_upload_bytes)?,
            resume_char_limit: parse_env("RESUME_CHAR_LIMIT", defaults.resume_char_limit)?,
            resume_page_limit: parse_env("RESUME_PAGE_LIMIT", defaults.resume_page_limit)?,
            session_ttl_secs: parse_env("SESSION_TTL_SECS", defaults.session_ttl_secs)?,
            session_sweep_secs: parse_env("SESSION_SWEEP_SECS", defaults.session_sweep_secs)?,
            relay_strict_lines: parse_env("RELAY_STRICT_LINES", defaults.relay_strict_lines)?,
            relay_max_line_bytes: parse_env("RELAY_MAX_LINE_BYTES", defaults.relay_max_line_bytes)?,
        })
    }
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value: {raw}")),
        Err(_) => Ok(default),
    }
}
