//! Transport abstraction
//!
//! A [`Transport`] performs exactly one HTTP exchange. Retries, caching and
//! callback delivery all live above it, so tests can swap in a scripted
//! transport without touching the network.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::app::models::{Headers, Method, Request};
use crate::errors::{TransportError, TransportResult};

/// A fully resolved HTTP request ready for the wire
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub method: Method,
    /// URL including any query string built from GET parameters
    pub url: String,
    pub headers: Headers,
    /// Content type and bytes of the request body
    pub body: Option<(String, Vec<u8>)>,
    pub connect_timeout: Duration,
    pub socket_timeout: Duration,
}

impl TransportRequest {
    /// Resolve a caller request into its wire form
    pub fn from_request(request: &Request) -> Self {
        Self {
            method: request.method,
            url: request.effective_url(),
            headers: request.headers.clone(),
            body: request.encoded_body(),
            connect_timeout: request.connect_timeout,
            socket_timeout: request.socket_timeout,
        }
    }

    /// Add headers, replacing any with the same name
    pub fn with_extra_headers(mut self, extra: &Headers) -> Self {
        for (name, value) in extra.iter() {
            self.headers.set(name, value);
        }
        self
    }

    /// Host part of the URL, for error reporting
    pub fn host(&self) -> String {
        Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default()
    }
}

/// Raw response of a single exchange
#[derive(Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn new(status: u16, headers: Headers, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_not_modified(&self) -> bool {
        self.status == 304
    }
}

impl fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .finish()
    }
}

/// Executes one HTTP exchange
///
/// Implementations must be cancel-safe: dropping the returned future aborts
/// the exchange.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    async fn execute(&self, request: &TransportRequest) -> TransportResult<TransportResponse>;
}

/// Check that a URL parses and uses an HTTP scheme
pub fn validate_url(url: &str) -> TransportResult<Url> {
    let parsed = Url::parse(url).map_err(|e| TransportError::MalformedUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(TransportError::MalformedUrl {
            url: url.to_string(),
            reason: format!("unsupported scheme '{other}'"),
        }),
    }
}
