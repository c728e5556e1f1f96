//! In-process test harness.
//!
//! Drives the axum router directly with `tower::ServiceExt::oneshot`, no socket.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use agent_core::kernel::{BaseConversationEngine, InMemorySessionStore, ServerDeps};
use agent_core::server::{build_app, AxumAppState};
use agent_core::Config;
use axum::body::{to_bytes, Body};
use axum::http::{header::CONTENT_TYPE, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::Value;
use session_lane::Frame;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

pub struct TestServer {
    pub app: Router,
    pub state: AxumAppState,
}

impl TestServer {
    /// Server over the demo engine with no artificial delay.
    pub fn demo() -> Self {
        let config = test_config();
        let deps = ServerDeps::demo(&config);
        Self::build(config, deps)
    }

    /// Server over a custom engine and a fresh in-memory store.
    pub fn with_engine(engine: Arc<dyn BaseConversationEngine>) -> Self {
        let deps = ServerDeps::new(engine, Arc::new(InMemorySessionStore::new()));
        Self::build(test_config(), deps)
    }

    fn build(config: Config, deps: ServerDeps) -> Self {
        // Honors RUST_LOG. Run with: RUST_LOG=debug cargo test -- --nocapture
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let state = AxumAppState::new(config, deps, CancellationToken::new());
        Self {
            app: build_app(state.clone()),
            state,
        }
    }

    pub async fn send(&self, method: Method, path: &str, body: Option<Value>) -> Response {
        let mut request = Request::builder().method(method).uri(path);
        let body = match body {
            Some(json) => {
                request = request.header(CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        self.app
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap()
    }

    /// Send and read the whole body as JSON.
    pub async fn json(&self, method: Method, path: &str, body: Option<Value>) -> (StatusCode, Value) {
        let response = self.send(method, path, body).await;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    /// POST /chat/stream and collect every frame until the stream closes.
    pub async fn stream_chat(&self, body: Value) -> (StatusCode, Vec<(String, Value)>) {
        let response = self.send(Method::POST, "/chat/stream", Some(body)).await;
        let status = response.status();
        (status, read_frames(response).await)
    }

    pub fn active_sessions(&self) -> usize {
        self.state.serializer.registry().active_count()
    }

    /// Wait for the lock registry to drain.
    pub async fn wait_idle(&self) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.active_sessions() > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("registry should drain");
    }
}

/// Read an event-stream body to the end and parse its frames.
pub async fn read_frames(response: Response) -> Vec<(String, Value)> {
    let bytes = tokio::time::timeout(
        Duration::from_secs(10),
        to_bytes(response.into_body(), usize::MAX),
    )
    .await
    .expect("stream should close")
    .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    Frame::decode_stream(&text)
}

pub fn test_config() -> Config {
    Config {
        chunk_delay: Duration::ZERO,
        ..Config::default()
    }
}

pub fn event_names(frames: &[(String, Value)]) -> Vec<&str> {
    frames.iter().map(|(name, _)| name.as_str()).collect()
}
