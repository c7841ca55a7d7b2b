//! Response handler trait and stock handlers

use std::fmt;

use tokio::sync::mpsc;

use crate::app::models::{Headers, Request};
use crate::errors::RequestError;

use super::event::ResponseEvent;

/// Receives the events of one or more requests
///
/// Event callbacks run on the dispatcher thread, one at a time. The pre and
/// post process hooks run on the worker executing the request, exactly once
/// per request. Every method has an empty default.
pub trait ResponseHandler: Send + Sync {
    fn on_start(&self) {}

    /// Called before the `Success` that carries the cached body
    fn on_cache_hit(&self, _fresh: bool) {}

    fn on_success(&self, _status: i32, _headers: &Headers, _body: &[u8]) {}

    fn on_failure(
        &self,
        _status: i32,
        _headers: Option<&Headers>,
        _body: Option<&[u8]>,
        _error: &RequestError,
    ) {
    }

    fn on_retry(&self, _attempt: u32) {}

    fn on_cancel(&self) {}

    fn on_finish(&self) {}

    /// Routes an event to the matching callback
    ///
    /// Override to consume events as values instead.
    fn on_event(&self, event: &ResponseEvent) {
        match event {
            ResponseEvent::Started => self.on_start(),
            ResponseEvent::CacheHit { fresh } => self.on_cache_hit(*fresh),
            ResponseEvent::Success {
                status,
                headers,
                body,
            } => self.on_success(*status, headers, body),
            ResponseEvent::Failure {
                status,
                headers,
                body,
                error,
            } => self.on_failure(*status, headers.as_ref(), body.as_deref(), error),
            ResponseEvent::Retry(attempt) => self.on_retry(*attempt),
            ResponseEvent::Cancelled => self.on_cancel(),
            ResponseEvent::Finished => self.on_finish(),
        }
    }

    /// Runs on the worker before the request starts
    fn on_pre_process(&self, _request: &Request) {}

    /// Runs on the worker after the response has been handled
    fn on_post_process(&self, _request: &Request) {}
}

/// Handler that ignores every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;

impl ResponseHandler for NoopHandler {}

/// Handler forwarding every event into a channel
///
/// Useful when the consumer is async code rather than a callback object.
#[derive(Clone)]
pub struct ChannelHandler {
    sender: mpsc::UnboundedSender<ResponseEvent>,
}

impl ChannelHandler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ResponseEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl fmt::Debug for ChannelHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelHandler")
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

impl ResponseHandler for ChannelHandler {
    fn on_event(&self, event: &ResponseEvent) {
        // receiver gone means nobody is listening any more
        let _ = self.sender.send(event.clone());
    }
}

/// Handler calling a closure for every event
pub struct FnHandler<F> {
    callback: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&ResponseEvent) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ResponseHandler for FnHandler<F>
where
    F: Fn(&ResponseEvent) + Send + Sync,
{
    fn on_event(&self, event: &ResponseEvent) {
        (self.callback)(event)
    }
}
