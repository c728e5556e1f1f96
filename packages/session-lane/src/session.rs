//! One request, end to end.
//!
//! ```text
//! open frame ─► serializer.run(key) ─► producer() ─► relay ─► chunk frames
//!                                                       │
//!                        end / error / (nothing on disconnect) ◄─┘
//!                                                       │
//!                                                    close
//! ```
//!
//! The producer is built inside the serialized section so it observes the
//! state left by the previous operation on the same key.

use futures::Stream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::chunk::Chunk;
use crate::connection::{Connection, FrameTransport};
use crate::error::{LaneError, LifecycleError, RelayError, SessionError, SinkError};
use crate::key::SessionKey;
use crate::relay::{relay, RelayStats};
use crate::serializer::KeyedSerializer;

/// How a streamed session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// `end` was emitted.
    Completed(RelayStats),
    /// `error` was emitted with this message.
    Failed(String),
    /// The caller went away; no terminal frame was emitted.
    Disconnected,
}

/// Message sent in the `error` frame of sessions cut short by shutdown.
pub const SHUTDOWN_MESSAGE: &str = "server shutting down";

/// Open `transport` for `key`, run the producer under the key's lock, relay
/// its chunks, emit exactly one terminal frame and close.
///
/// `cancel` is the disconnect signal. It aborts the session whether it is
/// still queued for the key or already streaming; the key is released either
/// way.
pub async fn stream_session<T, F, P>(
    serializer: &KeyedSerializer,
    key: SessionKey,
    transport: T,
    cancel: CancellationToken,
    producer: F,
) -> Result<SessionOutcome, SessionError>
where
    T: FrameTransport,
    F: FnOnce() -> P + Send,
    P: Stream<Item = anyhow::Result<Chunk>> + Send,
{
    stream_session_until(serializer, key, transport, cancel, CancellationToken::new(), producer)
        .await
}

/// [`stream_session`] that also stops when `shutdown` fires.
///
/// Unlike a disconnect the caller is still listening, so a session stopped by
/// shutdown gets an `error` frame carrying [`SHUTDOWN_MESSAGE`] before the
/// connection closes.
pub async fn stream_session_until<T, F, P>(
    serializer: &KeyedSerializer,
    key: SessionKey,
    transport: T,
    cancel: CancellationToken,
    shutdown: CancellationToken,
    producer: F,
) -> Result<SessionOutcome, SessionError>
where
    T: FrameTransport,
    F: FnOnce() -> P + Send,
    P: Stream<Item = anyhow::Result<Chunk>> + Send,
{
    let mut connection = Connection::new(transport);

    match connection.open(key.clone()).await {
        Ok(()) => {}
        Err(LifecycleError::Transport(SinkError::Closed)) => {
            info!(session_key = %key, "caller gone before open");
            connection.abort().await;
            return Ok(SessionOutcome::Disconnected);
        }
        Err(e) => {
            connection.close().await;
            return Err(e.into());
        }
    }

    let drained = {
        let conn = &mut connection;
        let cancel_ref = &cancel;
        let run = serializer.run(&key, move || relay(producer(), conn, cancel_ref));
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Drained::Disconnected,
            _ = shutdown.cancelled() => Drained::ShuttingDown,
            drained = run => Drained::Finished(drained),
        }
    };

    let outcome = match drained {
        Drained::ShuttingDown => {
            info!(session_key = %key, chunks = connection.chunks_sent(), "session stopped by shutdown");
            finish(&key, connection.fail(SHUTDOWN_MESSAGE.to_string()).await);
            SessionOutcome::Failed(SHUTDOWN_MESSAGE.to_string())
        }
        Drained::Finished(Ok(Ok(stats))) => {
            finish(&key, connection.end().await);
            SessionOutcome::Completed(stats)
        }
        Drained::Finished(Ok(Err(RelayError::Producer(e)))) => {
            let message = format!("{:#}", e);
            finish(&key, connection.fail(message.clone()).await);
            SessionOutcome::Failed(message)
        }
        Drained::Finished(Err(e @ LaneError::HoldTimeout { .. })) => {
            let message = e.to_string();
            finish(&key, connection.fail(message.clone()).await);
            SessionOutcome::Failed(message)
        }
        Drained::Finished(Ok(Err(RelayError::Cancelled))) | Drained::Disconnected => {
            info!(session_key = %key, chunks = connection.chunks_sent(), "caller disconnected mid-session");
            connection.abort().await;
            return Ok(SessionOutcome::Disconnected);
        }
    };

    connection.close().await;
    Ok(outcome)
}

enum Drained {
    Finished(Result<Result<RelayStats, RelayError>, LaneError>),
    Disconnected,
    ShuttingDown,
}

/// A terminal frame that cannot be written is not worth failing over: the
/// connection closes next regardless.
fn finish(key: &SessionKey, written: Result<(), LifecycleError>) {
    if let Err(e) = written {
        warn!(session_key = %key, error = %e, "failed to write terminal frame");
    }
}
