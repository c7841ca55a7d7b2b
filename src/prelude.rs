//! Prelude module for httpkit
//!
//! Re-exports the items most integrations need, so a single
//! `use httpkit::prelude::*;` is enough for typical usage.
//!
//! # Usage
//!
//! ```rust,no_run
//! use httpkit::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let manager = HttpManager::new(ManagerConfig::default())?;
//!     let (_handle, mut events) =
//!         manager.perform_request_with_events(Request::get("https://example.com"));
//!
//!     while let Some(event) = events.recv().await {
//!         if matches!(event, ResponseEvent::Finished | ResponseEvent::Cancelled) {
//!             break;
//!         }
//!     }
//!     manager.shutdown().await;
//!     Ok(())
//! }
//! ```

// Core result types
pub use crate::errors::{AppError, RequestError, Result, TransportError};

// Engine components
pub use crate::app::{
    CacheConfig, CacheStats, ChannelHandler, ClientConfig, ConfigPresets, FnHandler, Headers,
    HttpManager, ManagerConfig, ManagerStats, Method, Priority, Request, RequestHandle,
    ResponseEvent, ResponseHandler, WorkerConfig,
};

// File configuration
pub use crate::config::AppConfig;

// Commonly used constants
pub use crate::constants::{STATUS_LOCAL, STATUS_LOCAL_EXPIRED, USER_AGENT};

// Standard library re-exports that are commonly needed
pub use std::sync::Arc;
pub use std::time::Duration;
