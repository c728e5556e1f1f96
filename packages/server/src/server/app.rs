//! Application setup and server configuration.

use std::sync::Arc;

use axum::{
    http::{header::CONTENT_TYPE, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use session_lane::KeyedSerializer;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::kernel::{BaseConversationEngine, BaseSessionStore, ServerDeps};
use crate::server::routes::{
    chat_handler, chat_stream_handler, clear_sessions_handler, get_session_handler,
    health_handler, list_sessions_handler, root_handler,
};

/// Shared application state
#[derive(Clone)]
pub struct AxumAppState {
    pub config: Arc<Config>,
    /// One serializer per process: every request for a session key goes
    /// through it.
    pub serializer: KeyedSerializer,
    pub engine: Arc<dyn BaseConversationEngine>,
    pub session_store: Arc<dyn BaseSessionStore>,
    /// Root of every in-flight session's cancellation token.
    pub shutdown: CancellationToken,
}

impl AxumAppState {
    pub fn new(config: Config, deps: ServerDeps, shutdown: CancellationToken) -> Self {
        Self {
            serializer: KeyedSerializer::with_config(config.serializer_config()),
            config: Arc::new(config),
            engine: deps.engine,
            session_store: deps.session_store,
            shutdown,
        }
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([CONTENT_TYPE]);

    if allowed_origins.is_empty() {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(origin = %origin, error = %e, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(origins))
}

/// Build the Axum application router
pub fn build_app(state: AxumAppState) -> Router {
    let cors = cors_layer(&state.config.allowed_origins);

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/chat", post(chat_handler))
        .route("/chat/stream", post(chat_stream_handler))
        .route(
            "/sessions",
            get(list_sessions_handler).delete(clear_sessions_handler),
        )
        .route("/sessions/:session_key", get(get_session_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
