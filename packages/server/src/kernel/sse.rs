//! Server-sent events transport.
//!
//! Bridges a session's frames onto an axum `Sse` body through a bounded
//! channel. The body holds a drop guard on the session's cancellation token,
//! so a caller that hangs up cancels the session.

use std::convert::Infallible;

use anyhow::anyhow;
use async_trait::async_trait;
use axum::response::sse::Event;
use futures::Stream;
use session_lane::{Frame, FrameTransport, SinkError};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

/// Frames buffered between the session and the response body.
const EVENT_BUFFER: usize = 16;

/// Writes frames into an SSE response body.
pub struct ChannelTransport {
    tx: Option<mpsc::Sender<Result<Event, Infallible>>>,
}

#[async_trait]
impl FrameTransport for ChannelTransport {
    async fn send(&mut self, frame: Frame) -> Result<(), SinkError> {
        let tx = self.tx.as_ref().ok_or(SinkError::Closed)?;

        let event = Event::default()
            .event(frame.event_name())
            .json_data(frame.payload())
            .map_err(|e| SinkError::Rejected(anyhow!("failed to encode {} frame: {}", frame.event_name(), e)))?;

        tx.send(Ok(event)).await.map_err(|_| SinkError::Closed)
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        // Dropping the sender ends the response body.
        self.tx.take();
        Ok(())
    }
}

/// Create a transport and the event stream it feeds.
///
/// Dropping the stream (client disconnect, server shutdown) cancels `cancel`.
pub fn channel(
    cancel: CancellationToken,
) -> (
    ChannelTransport,
    impl Stream<Item = Result<Event, Infallible>> + Send + 'static,
) {
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let guard = cancel.drop_guard();

    let events = ReceiverStream::new(rx).map(move |event| {
        let _held = &guard;
        event
    });

    (ChannelTransport { tx: Some(tx) }, events)
}
