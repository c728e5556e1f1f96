//! Kernel module - server infrastructure and dependencies.

pub mod deps;
pub mod demo_engine;
pub mod session_store;
pub mod sse;
pub mod traits;

pub use demo_engine::DemoEngine;
pub use deps::ServerDeps;
pub use session_store::{InMemorySessionStore, SessionState, Turn};
pub use traits::*;
