//! Request manager
//!
//! [`HttpManager`] ties the engine together: it resolves each request's cache
//! key, deduplicates concurrent fetches of the same URL, picks the shared or a
//! dedicated client, schedules an executor on the priority worker pool and
//! keeps the handles needed for cancellation by tag.
//!
//! # Key Features
//!
//! - **One context object**: construct once, clone freely
//! - **Serial callbacks**: every handler runs on one callback thread
//! - **Cancellation**: by handle, by tag (including parked duplicates) or all
//! - **Graceful shutdown**: drain the pool, flush callbacks, close the cache
//!
//! # Module Organization
//!
//! - [`config`] - Manager configuration
//! - [`core`] - The manager
//! - [`handle`] - Per-request handles
//! - [`stats`] - Engine-wide statistics
//! - [`signals`] - Ctrl-C / SIGTERM interrupts that cancel requests
//!
//! # Examples
//!
//! ```rust,no_run
//! use httpkit::app::dispatch::ResponseEvent;
//! use httpkit::app::manager::{HttpManager, ManagerConfig};
//! use httpkit::app::models::{Priority, Request};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = HttpManager::new(ManagerConfig::default())?;
//!
//! let request = Request::get("https://example.com/feed")
//!     .with_priority(Priority::High)
//!     .with_tag("feed");
//! let (_handle, mut events) = manager.perform_request_with_events(request);
//!
//! while let Some(event) = events.recv().await {
//!     if let ResponseEvent::Success { status, body, .. } = &event {
//!         println!("{} ({} bytes)", status, body.len());
//!     }
//!     if matches!(event, ResponseEvent::Finished | ResponseEvent::Cancelled) {
//!         break;
//!     }
//! }
//!
//! manager.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod handle;
pub mod signals;
pub mod stats;

#[cfg(test)]
mod tests;

pub use self::core::HttpManager;
pub use config::ManagerConfig;
pub use handle::RequestHandle;
pub use signals::{interrupt_channel, next_interrupt, Interrupt, InterruptListener};
pub use stats::ManagerStats;
