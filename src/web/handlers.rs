// MindHarbor - HTTP API handlers

use super::WebState;
use crate::session::ChatError;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

pub const USER_HEADER: &str = "x-user-id";

/// Error body shared by every endpoint: `{"success": false, "message": ...}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "success": false,
            "message": self.message,
        });
        (self.status, Json(body)).into_response()
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        let status = match &err {
            ChatError::Validation(_) => StatusCode::BAD_REQUEST,
            ChatError::SessionStateConflict { .. } => StatusCode::CONFLICT,
            ChatError::UnknownSession(_) => StatusCode::NOT_FOUND,
        };
        if status != StatusCode::BAD_REQUEST {
            tracing::error!("Chat request failed: {}", err);
        }
        Self::new(status, err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(StatusCode::BAD_REQUEST, rejection.body_text())
    }
}

fn user_id(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .ok_or_else(|| ApiError::new(StatusCode::UNAUTHORIZED, "Missing x-user-id header"))
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

/// POST /api/chat
pub async fn api_chat(
    State(state): State<Arc<WebState>>,
    headers: HeaderMap,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = user_id(&headers)?;
    let Json(payload) = payload.map_err(ApiError::from)?;
    let reply = state.agent.handle_user_message(&user, &payload.message).await?;

    Ok(Json(json!({
        "success": true,
        "response": reply.response_text,
        "sessionId": reply.session_id,
        "source": reply.source,
    })))
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<usize>,
}

/// GET /api/chat/history?limit=
pub async fn api_history(
    State(state): State<Arc<WebState>>,
    headers: HeaderMap,
    Query(params): Query<HistoryParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = user_id(&headers)?;
    let sessions = state.agent.list_recent_sessions(&user, params.limit).await;

    Ok(Json(json!({
        "success": true,
        "sessions": sessions,
    })))
}

/// POST /api/chat/new-session
pub async fn api_new_session(
    State(state): State<Arc<WebState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = user_id(&headers)?;
    let session = state.agent.start_new_session(&user).await?;

    Ok(Json(json!({
        "success": true,
        "session": session,
    })))
}

/// JSON status endpoint.
pub async fn api_status(State(state): State<Arc<WebState>>) -> Json<serde_json::Value> {
    let status = state.agent.status().await;

    Json(json!({
        "status": "online",
        "version": status.version,
        "model": status.model,
        "generator": status.generator.as_deref().unwrap_or("none"),
        "knowledge": status.knowledge,
        "users": status.users,
    }))
}

/// JSON metrics API endpoint.
pub async fn api_metrics(State(state): State<Arc<WebState>>) -> Json<crate::metrics::MetricsReport> {
    Json(state.agent.metrics().report().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ValidationError;

    #[test]
    fn test_user_id_header() {
        let mut headers = HeaderMap::new();
        assert!(user_id(&headers).is_err());
        headers.insert(USER_HEADER, "  ".parse().unwrap());
        assert!(user_id(&headers).is_err());
        headers.insert(USER_HEADER, "user-7".parse().unwrap());
        assert_eq!(user_id(&headers).unwrap(), "user-7");
    }

    #[test]
    fn test_chat_error_status_mapping() {
        let err = ApiError::from(ChatError::Validation(ValidationError::Empty));
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "Message cannot be empty");

        let err = ApiError::from(ChatError::SessionStateConflict {
            user_id: "u".into(),
            attempts: 3,
        });
        assert_eq!(err.status, StatusCode::CONFLICT);
    }
}
