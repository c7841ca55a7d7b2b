//! Request execution
//!
//! An [`AsyncRequestExecutor`] is the unit of work the manager hands to the
//! worker pool. It walks one request through cache lookup, network attempts
//! with retries, response delivery and cache persistence, reporting every
//! step to the request's handler through its
//! [`RequestSink`](crate::app::dispatch::RequestSink).
//!
//! # Module Organization
//!
//! - [`state`] - Lifecycle states and legal transitions
//! - [`core`] - The executor

pub mod core;
pub mod state;

#[cfg(test)]
mod tests;

pub use self::core::AsyncRequestExecutor;
pub use state::ExecState;
