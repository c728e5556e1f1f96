//! Server dependencies (using traits for testability)
//!
//! Central container for the collaborators a request handler needs. Tests
//! swap in their own engine or store through `ServerDeps::new`.

use std::sync::Arc;

use crate::config::Config;
use crate::kernel::{BaseConversationEngine, BaseSessionStore, DemoEngine, InMemorySessionStore};

#[derive(Clone)]
pub struct ServerDeps {
    pub engine: Arc<dyn BaseConversationEngine>,
    pub session_store: Arc<dyn BaseSessionStore>,
}

impl ServerDeps {
    pub fn new(
        engine: Arc<dyn BaseConversationEngine>,
        session_store: Arc<dyn BaseSessionStore>,
    ) -> Self {
        Self {
            engine,
            session_store,
        }
    }

    /// Demo engine over an in-memory store.
    pub fn demo(config: &Config) -> Self {
        Self::new(
            Arc::new(DemoEngine::new(config.chunk_delay)),
            Arc::new(InMemorySessionStore::new()),
        )
    }
}
