//! HTTP server exposing the upload route.
//!
//! ```no_run
//! use imageforge::server::{serve, ServerConfig};
//! use imageforge::GeminiProvider;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> imageforge::Result<()> {
//!     let provider = Arc::new(GeminiProvider::builder().build()?);
//!     serve(ServerConfig::from_env()?, provider).await
//! }
//! ```

mod config;
pub mod response;
mod upload;

pub use config::{ServerConfig, DEFAULT_ADDR, DEFAULT_BODY_LIMIT};
pub use response::{ErrorResponse, UploadResponse};

use crate::client::SelectionLimits;
use crate::error::Result;
use crate::image::ImageProvider;
use axum::extract::{DefaultBodyLimit, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Shared, immutable state for every request.
pub struct AppState {
    /// Provider that performs the generation.
    pub provider: Arc<dyn ImageProvider>,
    /// Caps enforced on each upload.
    pub limits: SelectionLimits,
    /// Request body limit, reported in errors.
    pub body_limit: usize,
}

impl AppState {
    /// Creates state with default upload limits.
    pub fn new(provider: Arc<dyn ImageProvider>) -> Self {
        Self {
            provider,
            limits: SelectionLimits::default(),
            body_limit: crate::server::DEFAULT_BODY_LIMIT,
        }
    }
}

/// Builds the application router.
pub fn router(provider: Arc<dyn ImageProvider>, config: &ServerConfig) -> Router {
    let state = AppState {
        body_limit: config.body_limit,
        ..AppState::new(provider)
    };
    router_with_state(state, config)
}

fn router_with_state(state: AppState, config: &ServerConfig) -> Router {
    let api = Router::new()
        .route("/api/upload", post(upload::upload))
        .route("/api/health", get(health))
        .layer(DefaultBodyLimit::max(config.body_limit))
        .with_state(Arc::new(state));

    let app = match &config.static_dir {
        Some(dir) => api.fallback_service(ServeDir::new(dir)),
        None => api,
    };

    app.layer(TraceLayer::new_for_http())
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "ok": true,
        "provider": state.provider.name(),
        "model": state.provider.model(),
    }))
}

/// Binds `config.addr` and serves until Ctrl-C.
pub async fn serve(config: ServerConfig, provider: Arc<dyn ImageProvider>) -> Result<()> {
    let app = router(provider, &config);
    let listener = tokio::net::TcpListener::bind(config.addr).await?;

    tracing::info!(
        addr = %listener.local_addr()?,
        body_limit = config.body_limit,
        static_dir = ?config.static_dir,
        "upload server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("upload server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}
