//! Events delivered to response handlers

use crate::app::models::Headers;
use crate::constants::http;
use crate::errors::RequestError;

/// One step in the life of a request, as seen by its handler
///
/// For a single request events arrive in order: `Started`, an optional
/// `CacheHit` with its `Success`, then `Success` or `Failure`, then
/// `Finished`. `Cancelled` is delivered at most once and nothing follows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseEvent {
    Started,
    /// A cached entry was found; `fresh` is false when it is past its TTL
    CacheHit { fresh: bool },
    /// `status` is an HTTP status or one of the local cache statuses
    Success {
        status: i32,
        headers: Headers,
        body: Vec<u8>,
    },
    /// `status` is 0 when no response was received
    Failure {
        status: i32,
        headers: Option<Headers>,
        body: Option<Vec<u8>>,
        error: RequestError,
    },
    /// Attempt number `n` failed and will be retried
    Retry(u32),
    Cancelled,
    Finished,
}

impl ResponseEvent {
    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            ResponseEvent::Started => "start",
            ResponseEvent::CacheHit { .. } => "cache-hit",
            ResponseEvent::Success { .. } => "success",
            ResponseEvent::Failure { .. } => "failure",
            ResponseEvent::Retry(_) => "retry",
            ResponseEvent::Cancelled => "cancel",
            ResponseEvent::Finished => "finish",
        }
    }

    /// Whether this is a success served from the local cache
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            ResponseEvent::Success { status, .. }
                if *status == http::STATUS_LOCAL || *status == http::STATUS_LOCAL_EXPIRED
        )
    }

    /// Failure with no HTTP response, e.g. a transport error or rejection
    pub fn failure(error: RequestError) -> Self {
        ResponseEvent::Failure {
            status: 0,
            headers: None,
            body: None,
            error,
        }
    }
}
