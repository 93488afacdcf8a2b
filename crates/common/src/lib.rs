//! Shortcraft Common Utilities
//!
//! Shared infrastructure for all Shortcraft crates:
//! - Error types and result aliases
//! - Injectable clocks for playback and expiring state
//! - Keyed stores with time-based expiry
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod store;

pub use clock::*;
pub use config::*;
pub use error::*;
pub use store::*;
