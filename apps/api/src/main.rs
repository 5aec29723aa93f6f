use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use resumechat::config::Config;
use resumechat::llm_client::OllamaClient;
use resumechat::resume::LibraryExtractor;
use resumechat::routes::build_router;
use resumechat::session::{spawn_sweeper, SessionStore};
use resumechat::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first so the log level is known
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={},tower_http={}",
                env!("CARGO_PKG_NAME"),
                &config.rust_log,
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Resume Chat API v{}", env!("CARGO_PKG_VERSION"));

    // Inference backend (Ollama-compatible)
    let backend = OllamaClient::new(config.ollama_api_url.clone())?;
    info!(
        "Inference backend: {} (default model: {})",
        backend.base_url(),
        config.ollama_model
    );

    // Session store + expiry sweeper
    let sessions = SessionStore::new(config.session_ttl_secs);
    spawn_sweeper(
        sessions.clone(),
        Duration::from_secs(config.session_sweep_secs.max(1)),
    );
    info!("Session store ready (ttl: {}s)", config.session_ttl_secs);

    let state = AppState {
        backend: Arc::new(backend),
        extractor: Arc::new(LibraryExtractor),
        sessions,
        config: config.clone(),
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
