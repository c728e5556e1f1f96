use axum::{extract::State, Json};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};

use crate::server::app::AxumAppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    timestamp: String,
    version: String,
    /// Session keys with in-flight or queued work.
    active_sessions: usize,
}

/// Health check endpoint
pub async fn health_handler(State(state): State<AxumAppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_sessions: state.serializer.registry().active_count(),
    })
}

/// API info
pub async fn root_handler() -> Json<Value> {
    Json(json!({
        "name": "Agent Chat Server",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "GET /health",
            "chat": "POST /chat",
            "chat_stream": "POST /chat/stream",
            "sessions": "GET /sessions",
            "session": "GET /sessions/:session_key",
            "clear_sessions": "DELETE /sessions",
        }
    }))
}
