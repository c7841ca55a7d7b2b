//! Bounded priority task queue
//!
//! This module provides the queue that feeds the worker pool. It orders work
//! by descending priority, keeps FIFO order within a priority level, and
//! refuses new elements once full instead of blocking the submitter.
//!
//! # Key Features
//!
//! - **Priority ordering**: highest priority leaves first, ties in insertion order
//! - **Non-blocking offer**: a full queue hands the element straight back
//! - **Eviction**: `remove_lowest_priority` and `evict_for` make room for
//!   more valuable work under pressure
//! - **Async consumers**: `take` and `poll` wait without holding a thread
//!
//! # Basic Usage
//!
//! ```rust,no_run
//! use httpkit::app::queue::{Prioritized, PriorityTaskQueue};
//!
//! struct Job(i32);
//! impl Prioritized for Job {
//!     fn priority(&self) -> i32 {
//!         self.0
//!     }
//! }
//!
//! # async fn example() {
//! let queue = PriorityTaskQueue::new(16);
//! queue.offer(Job(1)).ok();
//! queue.offer(Job(10)).ok();
//! assert_eq!(queue.take().await.map(|j| j.0), Some(10));
//! # }
//! ```

pub mod core;
pub mod stats;

#[cfg(test)]
mod tests;

pub use core::{Prioritized, PriorityTaskQueue, Rejected};
pub use stats::QueueStats;
