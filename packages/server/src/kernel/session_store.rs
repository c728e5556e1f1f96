//! In-process session store.
//!
//! Keeps conversation history for the lifetime of the process. Payloads are
//! plain serde types so a persistent store can reuse them.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use session_lane::SessionKey;
use tokio::sync::RwLock;

use super::traits::BaseSessionStore;

/// One exchange within a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub message: String,
    pub reply: String,
    pub at: DateTime<Utc>,
}

impl Turn {
    pub fn new(message: impl Into<String>, reply: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            reply: reply.into(),
            at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_key: SessionKey,
    pub turns: Vec<Turn>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionState {
    fn new(session_key: SessionKey) -> Self {
        let now = Utc::now();
        Self {
            session_key,
            turns: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Session store backed by a map in memory.
///
/// Thread-safe, cloneable. Clones share the same sessions.
#[derive(Clone, Default)]
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<SessionKey, SessionState>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BaseSessionStore for InMemorySessionStore {
    async fn get(&self, session_key: &SessionKey) -> Result<Option<SessionState>> {
        Ok(self.sessions.read().await.get(session_key).cloned())
    }

    async fn append_turn(&self, session_key: &SessionKey, turn: Turn) -> Result<SessionState> {
        let mut sessions = self.sessions.write().await;
        let state = sessions
            .entry(session_key.clone())
            .or_insert_with(|| SessionState::new(session_key.clone()));
        state.updated_at = turn.at;
        state.turns.push(turn);
        Ok(state.clone())
    }

    async fn list(&self) -> Result<Vec<SessionState>> {
        let mut sessions: Vec<SessionState> =
            self.sessions.read().await.values().cloned().collect();
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(sessions)
    }

    async fn clear(&self) -> Result<usize> {
        let mut sessions = self.sessions.write().await;
        let count = sessions.len();
        sessions.clear();
        Ok(count)
    }
}
