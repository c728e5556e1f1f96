//! # Session Lane
//!
//! Per-session serialization for conversational agents, plus the plumbing to
//! stream a session's output to a caller over a long-lived connection.
//!
//! ## Core Concepts
//!
//! - [`KeyedSerializer`] runs operations one at a time per [`SessionKey`], in
//!   the order they were submitted. Different keys run concurrently.
//! - [`relay`] drains a producer of [`Chunk`]s into a [`ChunkSink`], pulling
//!   one chunk at a time.
//! - [`Connection`] frames everything sent to a caller as `open`, `chunk`,
//!   `end` or `error` over a [`FrameTransport`].
//! - [`stream_session`] wires the three together for one request.
//!
//! ## Architecture
//!
//! ```text
//! request(key)
//!     │
//!     ▼
//! Connection.open ──► open frame
//!     │
//!     ▼
//! KeyedSerializer.run(key) ◄── waits for earlier work on key
//!     │
//!     ▼
//! producer() ──► relay ──► Connection (ChunkSink) ──► chunk frames
//!     │
//!     ├─ drained ──────► end frame
//!     ├─ failed ───────► error frame
//!     └─ disconnected ─► (no terminal frame)
//!     │
//!     ▼
//! Connection.close
//! ```
//!
//! ## Key Invariants
//!
//! 1. **One at a time per key** - A same-key operation never starts before the
//!    previous one has settled
//! 2. **Call order is queue order** - Registration happens synchronously in `run`
//! 3. **Keys never leak** - Every exit path releases the key, panics included
//! 4. **Identity-checked release** - An earlier operation never evicts a later one
//! 5. **Exactly one terminal frame** - Unless the caller disconnected
//!
//! ## Guarantees
//!
//! - **In-process only**: the registry lives in memory; run one instance per
//!   set of keys
//! - **No coalescing**: concurrent same-key requests each run in turn
//! - **No retries**: a failed chunk write is logged and skipped
//!
//! ## Example
//!
//! ```ignore
//! use session_lane::{stream_session, KeyedSerializer, SessionKey};
//! use tokio_util::sync::CancellationToken;
//!
//! let serializer = KeyedSerializer::new();
//! let outcome = stream_session(
//!     &serializer,
//!     SessionKey::new("thread-42"),
//!     transport,
//!     CancellationToken::new(),
//!     || engine.stream(input, config),
//! )
//! .await?;
//! ```

pub mod chunk;
pub mod connection;
pub mod error;
pub mod frame;
pub mod key;
mod registry;
pub mod relay;
pub mod serializer;
pub mod session;


pub use chunk::Chunk;
pub use connection::{Connection, ConnectionState, FrameTransport, Terminal};
pub use error::{LaneError, LifecycleError, RelayError, SessionError, SinkError};
pub use frame::Frame;
pub use key::SessionKey;
pub use registry::LockRegistry;
pub use relay::{relay, sink_fn, ChunkSink, RelayStats, SinkFn};
pub use serializer::{KeyedSerializer, SerializerConfig, DEFAULT_MAX_HOLD};
pub use session::{stream_session, stream_session_until, SessionOutcome, SHUTDOWN_MESSAGE};

// Re-export async_trait so transports can be implemented without a direct dependency
pub use async_trait::async_trait;
