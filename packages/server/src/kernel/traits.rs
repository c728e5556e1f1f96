// Trait definitions for dependency injection
//
// These are COLLABORATOR traits only. The server threads a session key and a
// store handle through them; it never interprets what the engine produces
// beyond the Chunk shape.
//
// Naming convention: Base* for trait names (e.g., BaseConversationEngine)

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use session_lane::{Chunk, SessionKey};

use crate::kernel::session_store::{SessionState, Turn};

// =============================================================================
// Engine inputs and outputs
// =============================================================================

/// What the caller said this turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatInput {
    pub message: String,
}

/// Per-run configuration handed to the engine.
#[derive(Clone)]
pub struct RunConfig {
    pub session_key: SessionKey,
    pub checkpoint_store: Arc<dyn BaseSessionStore>,
}

/// Result of a non-streaming run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalState {
    pub session_key: SessionKey,
    pub reply: String,
    /// Turns recorded for the session after this run.
    pub turns: usize,
}

// =============================================================================
// Conversation Engine Trait (Infrastructure)
// =============================================================================

#[async_trait]
pub trait BaseConversationEngine: Send + Sync {
    /// Run one turn to completion.
    async fn invoke(&self, input: ChatInput, config: RunConfig) -> Result<FinalState>;

    /// Run one turn, yielding output as it is produced.
    ///
    /// Work must not start before the stream is first polled. Dropping the
    /// stream stops production.
    fn stream(&self, input: ChatInput, config: RunConfig) -> BoxStream<'static, Result<Chunk>>;
}

// =============================================================================
// Session Store Trait (Infrastructure)
// =============================================================================

#[async_trait]
pub trait BaseSessionStore: Send + Sync {
    async fn get(&self, session_key: &SessionKey) -> Result<Option<SessionState>>;

    /// Append a turn, creating the session if needed. Returns the updated state.
    async fn append_turn(&self, session_key: &SessionKey, turn: Turn) -> Result<SessionState>;

    /// All sessions, most recently updated first.
    async fn list(&self) -> Result<Vec<SessionState>>;

    /// Drop every session, returning how many there were.
    async fn clear(&self) -> Result<usize>;
}
