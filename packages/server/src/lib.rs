// Agent Chat Server - API Core
//
// HTTP surface for a conversational agent. Requests for the same session are
// serialized by session-lane; streaming replies go out as server-sent events.
//
// The conversation engine and session store are injected through the traits in
// kernel/traits.rs.

pub mod config;
pub mod kernel;
pub mod server;

pub use config::*;
