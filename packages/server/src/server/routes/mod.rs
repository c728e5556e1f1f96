// HTTP routes
pub mod chat;
pub mod health;
pub mod sessions;

pub use chat::*;
pub use health::*;
pub use sessions::*;
