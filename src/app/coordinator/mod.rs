//! Request deduplication
//!
//! Concurrent requests for the same cache key share one network exchange.
//! The coordinator keeps one in-flight marker per key together with the
//! requests parked behind it.
//!
//! # Key Features
//!
//! - **Single flight**: the first request for a key executes, later ones wait
//! - **Fresh re-race**: parked requests are resubmitted as new executions once
//!   the owner finishes, so they revalidate against the now-fresh cache
//! - **Tag cancellation**: parked requests can be pulled out by tag before
//!   they ever execute
//!
//! # Examples
//!
//! ```rust
//! use httpkit::app::coordinator::{EnterResult, RequestCoordinator, Waiter};
//! use httpkit::app::hash::CacheKey;
//!
//! struct Parked(&'static str);
//!
//! impl Waiter for Parked {
//!     fn is_cancelled(&self) -> bool {
//!         false
//!     }
//!     fn tag(&self) -> Option<&str> {
//!         Some(self.0)
//!     }
//! }
//!
//! let coordinator = RequestCoordinator::new();
//! let key = CacheKey::for_url("https://example.com/feed");
//!
//! let EnterResult::Enter(_, claim) = coordinator.try_enter(&key, Parked("a")) else {
//!     unreachable!()
//! };
//! assert!(matches!(coordinator.try_enter(&key, Parked("b")), EnterResult::Wait));
//! assert_eq!(coordinator.finish(&claim).len(), 1);
//! ```

pub mod dedup;

pub use dedup::{Claim, DedupGuard, EnterResult, RequestCoordinator, Waiter};
