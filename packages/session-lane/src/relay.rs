//! Streaming relay: drains a producer into a sink, one chunk at a time.
//!
//! Pull-based. The next chunk is requested only after the current one has been
//! handed to the sink, so a producer that respects backpressure upstream is
//! throttled to the consumer's pace. No buffering happens here.
//!
//! Failure policy:
//! - sink rejects a chunk: logged, counted, draining continues
//! - sink reports closed: producer dropped, `RelayError::Cancelled`
//! - producer fails: draining stops, `RelayError::Producer`
//! - cancel token fires: producer dropped, `RelayError::Cancelled`

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::chunk::Chunk;
use crate::error::{RelayError, SinkError};

/// Consumer of relayed chunks.
#[async_trait]
pub trait ChunkSink: Send {
    async fn accept(&mut self, chunk: Chunk) -> Result<(), SinkError>;
}

/// Adapts a synchronous callback into a [`ChunkSink`].
pub struct SinkFn<F>(F);

/// Wrap a callback as a sink.
pub fn sink_fn<F>(f: F) -> SinkFn<F>
where
    F: FnMut(Chunk) -> Result<(), SinkError> + Send,
{
    SinkFn(f)
}

#[async_trait]
impl<F> ChunkSink for SinkFn<F>
where
    F: FnMut(Chunk) -> Result<(), SinkError> + Send,
{
    async fn accept(&mut self, chunk: Chunk) -> Result<(), SinkError> {
        (self.0)(chunk)
    }
}

/// Counters for a completed drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Chunks the sink accepted.
    pub delivered: usize,
    /// Chunks the sink rejected (logged, not retried).
    pub rejected: usize,
}

impl RelayStats {
    pub fn produced(&self) -> usize {
        self.delivered + self.rejected
    }
}

/// Drain `producer` into `sink` in production order.
pub async fn relay<P, S>(
    producer: P,
    sink: &mut S,
    cancel: &CancellationToken,
) -> Result<RelayStats, RelayError>
where
    P: Stream<Item = anyhow::Result<Chunk>> + Send,
    S: ChunkSink + ?Sized,
{
    let mut producer = std::pin::pin!(producer);
    let mut stats = RelayStats::default();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(delivered = stats.delivered, "relay cancelled while awaiting producer");
                return Err(RelayError::Cancelled);
            }
            next = producer.next() => next,
        };

        let chunk = match next {
            None => break,
            Some(Ok(chunk)) => chunk,
            Some(Err(e)) => {
                error!(error = %e, delivered = stats.delivered, "producer failed mid-stream");
                return Err(RelayError::Producer(e));
            }
        };

        let index = stats.produced();
        let delivery = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(chunk_index = index, "relay cancelled during delivery");
                return Err(RelayError::Cancelled);
            }
            delivery = sink.accept(chunk) => delivery,
        };

        match delivery {
            Ok(()) => stats.delivered += 1,
            Err(SinkError::Closed) => {
                info!(chunk_index = index, "sink closed, stopping producer");
                return Err(RelayError::Cancelled);
            }
            Err(SinkError::Rejected(e)) => {
                warn!(chunk_index = index, error = %e, "sink rejected chunk, continuing");
                stats.rejected += 1;
            }
        }
    }

    debug!(
        delivered = stats.delivered,
        rejected = stats.rejected,
        "relay drained producer"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use anyhow::anyhow;
    use futures::stream;
    use serde_json::json;

    fn chunks(values: &[&str]) -> Vec<anyhow::Result<Chunk>> {
        values.iter().map(|v| Ok(Chunk::value(*v))).collect()
    }

    #[tokio::test]
    async fn test_delivers_in_production_order() {
        let mut seen = Vec::new();
        let mut sink = sink_fn(|chunk: Chunk| {
            seen.push(chunk.content().clone());
            Ok(())
        });

        let stats = relay(
            stream::iter(chunks(&["a", "b", "c"])),
            &mut sink,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        drop(sink);

        assert_eq!(stats, RelayStats { delivered: 3, rejected: 0 });
        assert_eq!(seen, vec![json!("a"), json!("b"), json!("c")]);
    }

    #[tokio::test]
    async fn test_sink_rejection_is_isolated() {
        let mut seen = Vec::new();
        let mut sink = sink_fn(|chunk: Chunk| {
            if chunk.content() == &json!("b") {
                return Err(SinkError::Rejected(anyhow!("flaky consumer")));
            }
            seen.push(chunk.content().clone());
            Ok(())
        });

        let stats = relay(
            stream::iter(chunks(&["a", "b", "c"])),
            &mut sink,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        drop(sink);

        assert_eq!(stats, RelayStats { delivered: 2, rejected: 1 });
        assert_eq!(seen, vec![json!("a"), json!("c")]);
    }

    #[tokio::test]
    async fn test_producer_failure_stops_draining() {
        let pulled = Arc::new(AtomicUsize::new(0));
        let counter = pulled.clone();
        let producer = stream::iter(vec![
            Ok(Chunk::value("a")),
            Err(anyhow!("model unavailable")),
            Ok(Chunk::value("never")),
        ])
        .inspect(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let mut delivered = 0;
        let mut sink = sink_fn(|_| {
            delivered += 1;
            Ok(())
        });

        let err = relay(producer, &mut sink, &CancellationToken::new())
            .await
            .unwrap_err();
        drop(sink);

        assert!(matches!(err, RelayError::Producer(ref e) if e.to_string() == "model unavailable"));
        assert_eq!(delivered, 1);
        assert_eq!(pulled.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_closed_sink_cancels_drain() {
        let mut calls = 0;
        let mut sink = sink_fn(|_| {
            calls += 1;
            Err(SinkError::Closed)
        });

        let err = relay(
            stream::iter(chunks(&["a", "b"])),
            &mut sink,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        drop(sink);

        assert!(matches!(err, RelayError::Cancelled));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_cancel_stops_pending_producer() {
        let cancel = CancellationToken::new();
        let mut sink = sink_fn(|_| Ok(()));

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            trigger.cancel();
        });

        let err = relay(stream::pending(), &mut sink, &cancel).await.unwrap_err();
        assert!(matches!(err, RelayError::Cancelled));
    }
}
