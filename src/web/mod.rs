// MindHarbor - HTTP API (Axum)
//
// Thin JSON layer over `SupportAgent`. Authentication happens upstream; the
// caller's identity arrives in the `x-user-id` header.

pub mod handlers;

use crate::agent::SupportAgent;
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Shared state for web handlers.
#[derive(Clone)]
pub struct WebState {
    pub agent: Arc<SupportAgent>,
}

/// Build the API router.
pub fn router(agent: Arc<SupportAgent>) -> Router {
    let state = Arc::new(WebState { agent });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/chat", post(handlers::api_chat))
        .route("/api/chat/history", get(handlers::api_history))
        .route("/api/chat/new-session", post(handlers::api_new_session))
        .route("/api/status", get(handlers::api_status))
        .route("/api/metrics", get(handlers::api_metrics))
        .layer(cors)
        .with_state(state)
}

/// Start the API server and run until the listener fails.
pub async fn start_web_server(addr: SocketAddr, agent: Arc<SupportAgent>) -> anyhow::Result<()> {
    let app = router(agent);

    tracing::info!(addr = %addr, "Starting chat API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
