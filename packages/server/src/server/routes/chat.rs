//! Chat endpoints.
//!
//! POST /chat/stream  - text/event-stream of open, chunk*, end|error
//! POST /chat         - same request, one JSON reply
//!
//! Both run under the session key's lock, so a streaming and a non-streaming
//! request for one session never overlap.

use std::convert::Infallible;
use std::time::Instant;

use axum::{
    extract::{rejection::JsonRejection, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use session_lane::{stream_session_until, SessionKey, SessionOutcome};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Instrument};

use crate::kernel::{sse, ChatInput, RunConfig};
use crate::server::app::AxumAppState;
use crate::server::error::ApiError;
use crate::Config;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: Option<String>,
    pub session_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub success: bool,
    pub session_key: SessionKey,
    pub reply: String,
    pub turns: usize,
    /// Seconds, including time spent queued behind earlier requests.
    pub processing_time: f64,
}

/// Validate the body and resolve the session key. Touches no shared state.
fn resolve_request(
    payload: Result<Json<ChatRequest>, JsonRejection>,
    config: &Config,
) -> Result<(ChatInput, SessionKey), ApiError> {
    let Json(request) = payload.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;

    let message = request
        .message
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("message is required".to_string()))?;

    if message.chars().count() > config.max_message_chars {
        return Err(ApiError::BadRequest(format!(
            "message must be at most {} characters",
            config.max_message_chars
        )));
    }

    let session_key = match request.session_key {
        Some(key) if !key.trim().is_empty() => SessionKey::new(key),
        _ => SessionKey::generate(&config.session_key_prefix),
    };

    Ok((ChatInput { message }, session_key))
}

/// Streaming chat handler.
///
/// The session runs on its own task and writes frames into the response body.
/// If the client hangs up, the body is dropped and the session is cancelled.
/// Server shutdown is a separate signal: the client is still there, so it
/// gets an `error` frame before the stream closes.
pub async fn chat_stream_handler(
    State(state): State<AxumAppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let (input, session_key) = resolve_request(payload, &state.config)?;

    let cancel = CancellationToken::new();
    let (transport, events) = sse::channel(cancel.clone());
    let shutdown = state.shutdown.clone();

    let serializer = state.serializer.clone();
    let engine = state.engine.clone();
    let run_config = RunConfig {
        session_key: session_key.clone(),
        checkpoint_store: state.session_store.clone(),
    };
    let span = tracing::info_span!("chat_stream", session_key = %session_key);

    tokio::spawn(
        async move {
            let started = Instant::now();
            let result = stream_session_until(
                &serializer,
                session_key,
                transport,
                cancel,
                shutdown,
                move || engine.stream(input, run_config),
            )
            .await;

            match result {
                Ok(SessionOutcome::Completed(stats)) => info!(
                    delivered = stats.delivered,
                    rejected = stats.rejected,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "stream completed"
                ),
                Ok(SessionOutcome::Failed(message)) => {
                    info!(message = %message, "stream ended with error frame")
                }
                Ok(SessionOutcome::Disconnected) => info!("client disconnected"),
                Err(e) => error!(error = %e, "stream session failed"),
            }
        }
        .instrument(span),
    );

    Ok(Sse::new(events).keep_alive(KeepAlive::new().interval(state.config.keep_alive)))
}

/// Non-streaming chat handler.
pub async fn chat_handler(
    State(state): State<AxumAppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let started = Instant::now();
    let (input, session_key) = resolve_request(payload, &state.config)?;

    let engine = state.engine.clone();
    let run_config = RunConfig {
        session_key: session_key.clone(),
        checkpoint_store: state.session_store.clone(),
    };

    let final_state = state
        .serializer
        .run(&session_key, || engine.invoke(input, run_config))
        .await??;

    Ok(Json(ChatResponse {
        success: true,
        session_key,
        reply: final_state.reply,
        turns: final_state.turns,
        processing_time: started.elapsed().as_secs_f64(),
    }))
}
