//! HTTP request handlers

use super::types::{ErrorResponse, HealthResponse};
use super::ws::{chat_websocket, voice_websocket};
use super::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/health", get(health))
        .route("/api/v1/chat/websocket", get(chat_websocket))
        .route("/api/v1/voice/websocket", get(voice_websocket))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, AppError> {
    let db = state.db.clone();
    tokio::task::spawn_blocking(move || db.session_count())
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
        .map_err(|e| {
            tracing::warn!(error = %e, "Health check could not reach the session store");
            AppError::Unavailable("session store unavailable".to_string())
        })?;
    Ok(Json(HealthResponse { status: "ok" }))
}

#[derive(Debug)]
enum AppError {
    Unavailable(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
