//! Session inspection endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use session_lane::SessionKey;

use crate::kernel::SessionState;
use crate::server::app::AxumAppState;
use crate::server::error::ApiError;

#[derive(Serialize)]
pub struct SessionSummary {
    session_key: SessionKey,
    turns: usize,
    updated_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct SessionList {
    total_sessions: usize,
    sessions: Vec<SessionSummary>,
}

pub async fn list_sessions_handler(
    State(state): State<AxumAppState>,
) -> Result<Json<SessionList>, ApiError> {
    let sessions: Vec<SessionSummary> = state
        .session_store
        .list()
        .await?
        .into_iter()
        .map(|s| SessionSummary {
            turns: s.turns.len(),
            session_key: s.session_key,
            updated_at: s.updated_at,
        })
        .collect();

    Ok(Json(SessionList {
        total_sessions: sessions.len(),
        sessions,
    }))
}

pub async fn get_session_handler(
    State(state): State<AxumAppState>,
    Path(session_key): Path<String>,
) -> Result<Json<SessionState>, ApiError> {
    let key = SessionKey::new(session_key);
    state
        .session_store
        .get(&key)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Session {} not found", key)))
}

pub async fn clear_sessions_handler(
    State(state): State<AxumAppState>,
) -> Result<Json<Value>, ApiError> {
    let cleared = state.session_store.clear().await?;
    tracing::info!(cleared, "sessions cleared");
    Ok(Json(json!({ "message": format!("Cleared {} sessions", cleared) })))
}
