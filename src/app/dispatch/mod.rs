//! Callback delivery
//!
//! Executors never call handlers directly. They push [`ResponseEvent`]s
//! through a per-request [`RequestSink`] into the [`CallbackDispatcher`],
//! whose single thread invokes the [`ResponseHandler`]s serially.
//!
//! # Module Organization
//!
//! - [`event`] - The event enum
//! - [`handler`] - Handler trait plus channel, closure and no-op handlers
//! - [`dispatcher`] - The callback thread and per-request sinks

pub mod dispatcher;
pub mod event;
pub mod handler;

pub use dispatcher::{CallbackDispatcher, EventSender, RequestSink};
pub use event::ResponseEvent;
pub use handler::{ChannelHandler, FnHandler, NoopHandler, ResponseHandler};
