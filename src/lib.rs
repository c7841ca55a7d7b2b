//! httpkit Library
//!
//! An asynchronous HTTP request engine. Requests run on a bounded priority
//! worker pool, concurrent fetches of the same URL are collapsed into one,
//! responses are kept in a TTL-aware disk cache and every callback is
//! delivered serially on a single dispatch thread.

pub mod app;
pub mod cli;
pub mod config;
pub mod constants;
pub mod errors;
pub mod prelude;

// Re-export commonly used types for convenience
pub use errors::{AppError, Result};
