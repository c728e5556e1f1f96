//! Connection lifecycle manager.
//!
//! Owns one caller-facing transport for the duration of a request and frames
//! everything sent over it.
//!
//! ```text
//! Init ──open──► Open ──chunk──► Streaming ──┬─end───► Terminal(End) ───┐
//!                  │                 ▲ │      └─fail──► Terminal(Error) ─┤
//!                  │                 └─┘                                 ├─close──► Closed
//!                  └──────────────────── abort (caller gone) ────────────┘
//! ```
//!
//! Exactly one of `end`/`error` is emitted per connection. The state moves to
//! its terminal value before the frame is written, so a second attempt is
//! rejected even if the first write failed.

use anyhow::anyhow;
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::chunk::Chunk;
use crate::error::{LifecycleError, SinkError};
use crate::frame::Frame;
use crate::key::SessionKey;
use crate::relay::ChunkSink;

/// Which terminal frame a connection emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    End,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Init,
    Open,
    Streaming,
    Terminal(Terminal),
    Closed,
}

/// Outbound channel to a caller.
#[async_trait]
pub trait FrameTransport: Send {
    /// Write one frame. `SinkError::Closed` means the caller is gone.
    async fn send(&mut self, frame: Frame) -> Result<(), SinkError>;

    /// Close the channel. Called at most once.
    async fn close(&mut self) -> anyhow::Result<()>;
}

/// One long-lived exchange with a caller.
pub struct Connection<T: FrameTransport> {
    transport: T,
    state: ConnectionState,
    session_key: Option<SessionKey>,
    chunks_sent: usize,
}

impl<T: FrameTransport> Connection<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            state: ConnectionState::Init,
            session_key: None,
            chunks_sent: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn session_key(&self) -> Option<&SessionKey> {
        self.session_key.as_ref()
    }

    pub fn chunks_sent(&self) -> usize {
        self.chunks_sent
    }

    /// Emit the `open` frame carrying the resolved session key.
    pub async fn open(&mut self, session_key: SessionKey) -> Result<(), LifecycleError> {
        self.require(&[ConnectionState::Init], "open")?;

        self.transport
            .send(Frame::Open {
                session_key: session_key.clone(),
            })
            .await?;

        debug!(session_key = %session_key, "connection open");
        self.session_key = Some(session_key);
        self.state = ConnectionState::Open;
        Ok(())
    }

    /// Frame and emit one chunk.
    pub async fn send_chunk(&mut self, chunk: Chunk) -> Result<(), SinkError> {
        if !matches!(self.state, ConnectionState::Open | ConnectionState::Streaming) {
            return Err(SinkError::Rejected(anyhow!(
                "cannot stream a chunk in state {:?}",
                self.state
            )));
        }

        self.transport.send(Frame::Chunk(chunk)).await?;
        self.state = ConnectionState::Streaming;
        self.chunks_sent += 1;
        Ok(())
    }

    /// Emit the `end` frame.
    pub async fn end(&mut self) -> Result<(), LifecycleError> {
        self.terminate(Terminal::End, Frame::End).await
    }

    /// Emit the `error` frame with a human-readable message.
    pub async fn fail(&mut self, message: impl Into<String>) -> Result<(), LifecycleError> {
        let message = message.into();
        self.terminate(Terminal::Error, Frame::Error { message }).await
    }

    async fn terminate(&mut self, terminal: Terminal, frame: Frame) -> Result<(), LifecycleError> {
        self.require(
            &[ConnectionState::Open, ConnectionState::Streaming],
            match terminal {
                Terminal::End => "end",
                Terminal::Error => "fail",
            },
        )?;

        self.state = ConnectionState::Terminal(terminal);
        self.transport.send(frame).await?;
        Ok(())
    }

    /// Close the transport. Best-effort: a failing close is logged and the
    /// connection is considered closed anyway. Idempotent.
    pub async fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        if let Err(e) = self.transport.close().await {
            warn!(
                session_key = ?self.session_key,
                error = %e,
                "failed to close transport"
            );
        }
        debug!(session_key = ?self.session_key, chunks = self.chunks_sent, "connection closed");
        self.state = ConnectionState::Closed;
    }

    /// Close without a terminal frame. Used when the caller has gone away.
    pub async fn abort(&mut self) {
        debug!(session_key = ?self.session_key, "connection aborted by caller");
        self.close().await;
    }

    fn require(&self, allowed: &[ConnectionState], action: &'static str) -> Result<(), LifecycleError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(LifecycleError::InvalidTransition {
                from: self.state,
                action,
            })
        }
    }
}

#[async_trait]
impl<T: FrameTransport> ChunkSink for Connection<T> {
    async fn accept(&mut self, chunk: Chunk) -> Result<(), SinkError> {
        self.send_chunk(chunk).await
    }
}

// =============================================================================
// Testing transport
// =============================================================================

/// In-memory transport recording every frame. Used by tests in this crate and
/// by downstream crates with the `testing` feature.
#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Clone, Default)]
    pub struct RecordingTransport {
        frames: Arc<Mutex<Vec<Frame>>>,
        closes: Arc<Mutex<usize>>,
        reject_chunks: Arc<Mutex<HashSet<usize>>>,
        disconnect_after: Arc<Mutex<Option<usize>>>,
        fail_close: bool,
        /// Shared by clones so chunk indexes count across all of them.
        chunk_attempts: Arc<AtomicUsize>,
    }

    impl RecordingTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Reject the chunk frame with this zero-based index.
        pub fn rejecting_chunk(self, index: usize) -> Self {
            self.reject_chunks.lock().unwrap().insert(index);
            self
        }

        /// Report the caller gone once this many frames were written.
        pub fn disconnecting_after(self, frames: usize) -> Self {
            *self.disconnect_after.lock().unwrap() = Some(frames);
            self
        }

        pub fn failing_close(mut self) -> Self {
            self.fail_close = true;
            self
        }

        pub fn frames(&self) -> Vec<Frame> {
            self.frames.lock().unwrap().clone()
        }

        pub fn event_names(&self) -> Vec<&'static str> {
            self.frames().iter().map(Frame::event_name).collect()
        }

        pub fn close_count(&self) -> usize {
            *self.closes.lock().unwrap()
        }
    }

    #[async_trait]
    impl FrameTransport for RecordingTransport {
        async fn send(&mut self, frame: Frame) -> Result<(), SinkError> {
            if let Some(limit) = *self.disconnect_after.lock().unwrap() {
                if self.frames.lock().unwrap().len() >= limit {
                    return Err(SinkError::Closed);
                }
            }
            if matches!(frame, Frame::Chunk(_)) {
                let index = self.chunk_attempts.fetch_add(1, Ordering::SeqCst);
                if self.reject_chunks.lock().unwrap().contains(&index) {
                    return Err(SinkError::Rejected(anyhow!("write failed for chunk {}", index)));
                }
            }
            self.frames.lock().unwrap().push(frame);
            Ok(())
        }

        async fn close(&mut self) -> anyhow::Result<()> {
            *self.closes.lock().unwrap() += 1;
            if self.fail_close {
                anyhow::bail!("socket already reset");
            }
            Ok(())
        }
    }
}
