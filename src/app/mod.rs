//! Core request engine for httpkit
//!
//! This module contains the engine components: request models and cache
//! keys, the bounded priority queue and worker pool, the disk cache, the
//! HTTP clients, the request executor, serial callback dispatch, duplicate
//! request coordination and the manager that ties them together.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use httpkit::app::{FnHandler, HttpManager, ManagerConfig, Request, ResponseEvent};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = HttpManager::new(ManagerConfig::default())?;
//!
//! let handler = FnHandler::new(|event: &ResponseEvent| {
//!     if let ResponseEvent::Success { status, body, .. } = event {
//!         println!("{} -> {} bytes", status, body.len());
//!     }
//! });
//! let handle = manager.perform_request(Request::get("https://example.com"), Arc::new(handler));
//!
//! // later
//! manager.cancel_request(&handle);
//! manager.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod client;
pub mod coordinator;
pub mod dispatch;
pub mod executor;
pub mod hash;
pub mod manager;
pub mod models;
pub mod queue;
pub mod worker;

// Re-export main public API
pub use cache::{CacheConfig, CacheEntry, CacheStats, DiskCache};
pub use client::{
    ClientConfig, ClientRegistry, MockReply, MockTransport, MockTransportFactory, RetryHandler,
    Transport, TransportFactory,
};
pub use dispatch::{ChannelHandler, FnHandler, NoopHandler, ResponseEvent, ResponseHandler};
pub use executor::{AsyncRequestExecutor, ExecState};
pub use hash::CacheKey;
pub use manager::{HttpManager, ManagerConfig, ManagerStats, RequestHandle};
pub use models::{Headers, Method, Priority, Proxy, Request, RequestBody};
pub use queue::{PriorityTaskQueue, QueueStats};
pub use worker::{ConfigPresets, PoolStats, PriorityTask, TaskHandle, WorkerConfig, WorkerPool};
