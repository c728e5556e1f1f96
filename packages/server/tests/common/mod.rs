// Common test utilities

pub mod engines;
pub mod harness;

pub use engines::*;
pub use harness::*;
