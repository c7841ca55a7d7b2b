//! Priority worker pool
//!
//! This module implements the executor that runs request work. Workers are
//! tokio tasks that pull [`PriorityTask`]s from a bounded
//! [`PriorityTaskQueue`](crate::app::queue::PriorityTaskQueue); the pool grows
//! from its core size towards its maximum under load and sheds idle surplus
//! workers after a keep-alive period.
//!
//! # Key Features
//!
//! - **Priority scheduling**: higher-priority tasks leave the queue first
//! - **Eviction under pressure**: a full pool evicts its lowest queued task
//!   for an equal-or-higher newcomer before refusing with `PoolSaturated`
//! - **Cancellation**: every task gets a [`TaskHandle`] with a cancellation token
//! - **Exactly-once disposal**: each task is either run or discarded once
//! - **Shutdown**: graceful `shutdown` or immediate `shutdown_now`
//!
//! # Module Organization
//!
//! - [`config`] - Pool sizing and presets
//! - [`types`] - Task trait, task handles and states
//! - [`pool`] - The pool itself
//! - [`stats`] - Counters and snapshots
//!
//! # Basic Usage
//!
//! ```rust,no_run
//! use httpkit::app::worker::{ConfigPresets, WorkerPool};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = WorkerPool::new(ConfigPresets::elastic())?;
//! let handle = pool.spawn(async {
//!     println!("running on a worker");
//! })?;
//! handle.settled().await;
//! pool.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod pool;
pub mod stats;
pub mod types;

#[cfg(test)]
mod tests;

pub use config::{ConfigPresets, WorkerConfig};
pub use pool::{PoolState, WorkerPool};
pub use stats::PoolStats;
pub use types::{FnTask, PriorityTask, TaskHandle, TaskState};
