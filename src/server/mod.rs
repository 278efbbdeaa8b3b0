//! HTTP service exposing prediction and training

pub mod http;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::learning::ModelLifecycle;

/// Shared server state
#[derive(Clone)]
pub struct ServerState {
    pub config: Arc<Config>,
    pub lifecycle: ModelLifecycle,
}

impl ServerState {
    pub fn new(config: Config) -> Self {
        let lifecycle = ModelLifecycle::from_config(&config);
        Self {
            config: Arc::new(config),
            lifecycle,
        }
    }
}

/// Build the application router with middleware attached
pub fn router(state: ServerState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(http::health_handler))
        .route("/predict", post(http::predict_handler))
        .route("/train", post(http::train_handler))
        .route("/status", get(http::status_handler))
        .route("/model/reload", post(http::reload_handler))
        .layer(RequestBodyLimitLayer::new(state.config.server.body_limit_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the web server
pub async fn start(config: Config, host: Option<String>, port: Option<u16>) -> Result<()> {
    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", host, port))?;

    let state = ServerState::new(config);

    // Surface a corrupt artifact at startup instead of on the first request
    match state.lifecycle.registry.current() {
        Ok(Some(model)) => info!("Serving model v{}", model.version),
        Ok(None) => info!("No model trained yet; predictions unavailable until first cycle"),
        Err(e) => tracing::warn!("Model artifact could not be loaded: {}", e),
    }

    let data_dir = state.config.storage.data_dir.display().to_string();
    let app = router(state);

    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("     Agri Payout Service Starting");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();
    println!("✓ Data directory: {}", data_dir);
    println!("🚀 Listening on http://{}", addr);
    println!();

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
