//! Per-key operation serializer.
//!
//! Operations submitted under the same session key run one at a time in the
//! order `run` was called. Operations under different keys never wait on each
//! other.
//!
//! # Example
//!
//! ```ignore
//! use session_lane::{KeyedSerializer, SessionKey};
//!
//! let serializer = KeyedSerializer::new();
//! let key = SessionKey::new("thread-42");
//!
//! let reply = serializer
//!     .run(&key, || async { engine.invoke(input, config).await })
//!     .await??;
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::LaneError;
use crate::key::SessionKey;
use crate::registry::{KeyLease, LockRegistry};

/// Default bound on how long one operation may hold a key.
pub const DEFAULT_MAX_HOLD: Duration = Duration::from_secs(300);

/// Configuration for [`KeyedSerializer`].
#[derive(Debug, Clone)]
pub struct SerializerConfig {
    /// Longest an operation may execute while holding its key. `None` disables
    /// the bound. Time spent queued behind earlier operations does not count.
    pub max_hold: Option<Duration>,
}

impl Default for SerializerConfig {
    fn default() -> Self {
        Self {
            max_hold: Some(DEFAULT_MAX_HOLD),
        }
    }
}

/// Serializes asynchronous operations per session key.
///
/// Cheap to clone; clones share one registry.
#[derive(Clone, Default)]
pub struct KeyedSerializer {
    registry: Arc<LockRegistry>,
    config: SerializerConfig,
}

impl KeyedSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: SerializerConfig) -> Self {
        Self {
            registry: Arc::new(LockRegistry::new()),
            config,
        }
    }

    /// Read-only view of the registry (health reporting, tests).
    pub fn registry(&self) -> &LockRegistry {
        &self.registry
    }

    pub fn config(&self) -> &SerializerConfig {
        &self.config
    }

    /// Run `op` once every operation previously submitted for `key` has settled.
    ///
    /// Registration happens when `run` is called, not when the returned future
    /// is first polled, so call order is queue order.
    ///
    /// The operation's output is returned as-is; a failing operation should
    /// return its error inside `T`. The key is released on every exit path,
    /// including when the returned future is dropped.
    ///
    /// Returns [`LaneError::HoldTimeout`] when the operation exceeds
    /// `max_hold`. The operation is dropped and its result discarded.
    pub fn run<F, Fut, T>(&self, key: &SessionKey, op: F) -> impl Future<Output = Result<T, LaneError>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let mut lease = KeyLease::acquire(self.registry.clone(), key.clone());
        let max_hold = self.config.max_hold;

        async move {
            lease.wait_turn().await;
            debug!(session_key = %lease.key(), "operation started");

            let result = match max_hold {
                Some(limit) => match tokio::time::timeout(limit, op()).await {
                    Ok(output) => Ok(output),
                    Err(_) => {
                        warn!(
                            session_key = %lease.key(),
                            limit_ms = limit.as_millis() as u64,
                            "operation exceeded max hold, force-releasing key"
                        );
                        Err(LaneError::HoldTimeout {
                            key: lease.key().clone(),
                            limit,
                        })
                    }
                },
                None => Ok(op().await),
            };

            debug!(session_key = %lease.key(), "operation settled");
            drop(lease);
            result
        }
    }
}
