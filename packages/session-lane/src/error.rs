//! Error types for the serializer, relay and connection lifecycle.
//!
//! Each stage has its own enum so callers can tell a producer failure from a
//! sink failure from a disconnect without downcasting.

use std::time::Duration;

use thiserror::Error;

use crate::key::SessionKey;

/// Errors raised by [`KeyedSerializer::run`](crate::KeyedSerializer::run).
///
/// The operation's own failure is not represented here: it travels inside the
/// operation's output.
#[derive(Debug, Error)]
pub enum LaneError {
    /// The operation held the key longer than the configured limit and was dropped.
    #[error("operation for session {key} exceeded max hold of {limit:?}")]
    HoldTimeout { key: SessionKey, limit: Duration },
}

/// Failure delivering one chunk or frame to a consumer.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The consumer is gone. Draining stops.
    #[error("sink closed")]
    Closed,

    /// This one delivery failed. Draining continues with the next chunk.
    #[error("sink rejected chunk: {0}")]
    Rejected(#[source] anyhow::Error),
}

/// Terminal outcome of a relay drain that did not complete.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The producer itself failed.
    #[error("producer failed: {0}")]
    Producer(#[source] anyhow::Error),

    /// The consumer disconnected or the drain was cancelled.
    #[error("relay cancelled")]
    Cancelled,
}

/// Illegal use of a [`Connection`](crate::Connection).
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("cannot {action} a connection in state {from:?}")]
    InvalidTransition {
        from: crate::connection::ConnectionState,
        action: &'static str,
    },

    #[error("transport failed: {0}")]
    Transport(#[from] SinkError),
}

/// Failure of a full [`stream_session`](crate::stream_session) run.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}
