//! Demo conversation engine.
//!
//! Stands in for a hosted model: it reads the session's history from the
//! checkpoint store, streams a canned reply word by word, and records the turn
//! once the reply is complete. A stream dropped halfway records nothing.

use std::time::Duration;

use anyhow::Result;
use async_stream::stream;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::{json, Value};
use session_lane::Chunk;
use tracing::debug;

use super::session_store::Turn;
use super::traits::{BaseConversationEngine, ChatInput, FinalState, RunConfig};

pub struct DemoEngine {
    chunk_delay: Duration,
}

impl DemoEngine {
    pub fn new(chunk_delay: Duration) -> Self {
        Self { chunk_delay }
    }
}

fn compose_reply(message: &str, turn: usize) -> String {
    if turn == 1 {
        format!("Hello! You said: \"{}\". Ask me anything else.", message.trim())
    } else {
        format!(
            "Turn {} of our conversation. You said: \"{}\".",
            turn,
            message.trim()
        )
    }
}

#[async_trait]
impl BaseConversationEngine for DemoEngine {
    async fn invoke(&self, input: ChatInput, config: RunConfig) -> Result<FinalState> {
        let session_key = config.session_key.clone();
        let mut reply = String::new();
        let mut turns = 0;

        let mut chunks = self.stream(input, config);
        while let Some(chunk) = chunks.next().await {
            match chunk? {
                Chunk::Value(Value::String(word)) => reply.push_str(&word),
                Chunk::WithMeta { meta, .. } => {
                    if let Some(n) = meta.get("turns").and_then(Value::as_u64) {
                        turns = n as usize;
                    }
                }
                Chunk::Value(_) => {}
            }
        }

        Ok(FinalState {
            session_key,
            reply,
            turns,
        })
    }

    fn stream(&self, input: ChatInput, config: RunConfig) -> BoxStream<'static, Result<Chunk>> {
        let delay = self.chunk_delay;

        Box::pin(stream! {
            yield Ok(Chunk::with_meta("thinking", json!({ "step": "thinking" })));

            let prior = match config.checkpoint_store.get(&config.session_key).await {
                Ok(state) => state,
                Err(e) => {
                    yield Err(e.context("failed to load session history"));
                    return;
                }
            };
            let turn = prior.map(|s| s.turns.len()).unwrap_or(0) + 1;
            let reply = compose_reply(&input.message, turn);

            for word in reply.split_inclusive(' ') {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                yield Ok(Chunk::value(word));
            }

            // Recorded only once the whole reply went out.
            let state = match config
                .checkpoint_store
                .append_turn(&config.session_key, Turn::new(input.message, reply))
                .await
            {
                Ok(state) => state,
                Err(e) => {
                    yield Err(e.context("failed to record turn"));
                    return;
                }
            };
            debug!(session_key = %config.session_key, turns = state.turns.len(), "turn recorded");

            yield Ok(Chunk::with_meta(
                "completed",
                json!({ "step": "completed", "turns": state.turns.len() }),
            ));
        })
    }
}
