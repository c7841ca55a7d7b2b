//! Error types for httpkit
//!
//! This module defines the error types for every component of the request
//! engine. Transport and request errors are `Clone` because they travel
//! inside [`ResponseEvent`](crate::app::dispatch::ResponseEvent) values that
//! are delivered to caller callbacks.

use std::path::PathBuf;
use thiserror::Error;

/// Failures raised by a transport while executing a single HTTP exchange
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// URL could not be parsed or uses an unsupported scheme
    #[error("Malformed URL: {url} - {reason}")]
    MalformedUrl { url: String, reason: String },

    /// Host name could not be resolved
    #[error("Unknown host: {host}")]
    UnknownHost { host: String },

    /// Internal transport fault (connection dropped before any response, client bug)
    #[error("Transport fault: {0}")]
    Internal(String),

    /// Generic I/O failure while sending the request or reading the response
    #[error("I/O error: {0}")]
    Io(String),

    /// Connect or read timeout elapsed
    #[error("Request timed out after {millis} ms")]
    Timeout { millis: u64 },
}

impl TransportError {
    /// Whether the retry handler may consider this failure at all
    pub fn is_retriable(&self) -> bool {
        !matches!(self, TransportError::MalformedUrl { .. })
    }

    /// Map a reqwest failure onto the transport taxonomy
    pub fn from_reqwest(err: &reqwest::Error, host: &str, timeout: std::time::Duration) -> Self {
        if err.is_builder() {
            return TransportError::MalformedUrl {
                url: err.url().map(|u| u.to_string()).unwrap_or_default(),
                reason: err.to_string(),
            };
        }
        if err.is_timeout() {
            return TransportError::Timeout {
                millis: timeout.as_millis() as u64,
            };
        }
        if err.is_connect() {
            if is_dns_failure(err) {
                return TransportError::UnknownHost {
                    host: host.to_string(),
                };
            }
            return TransportError::Io(err.to_string());
        }
        if err.is_request() || err.is_body() || err.is_decode() {
            let text = err.to_string();
            if text.contains("connection closed before message completed") {
                return TransportError::Internal(text);
            }
            return TransportError::Io(text);
        }
        TransportError::Internal(err.to_string())
    }
}

fn is_dns_failure(err: &reqwest::Error) -> bool {
    use std::error::Error as _;

    let mut source = err.source();
    while let Some(inner) = source {
        let text = inner.to_string();
        if text.contains("dns error")
            || text.contains("failed to lookup address")
            || text.contains("Name or service not known")
            || text.contains("No such host")
        {
            return true;
        }
        source = inner.source();
    }
    false
}

/// Errors delivered to `on_failure` callbacks
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// Network failure after the retry policy gave up
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Server answered with a non-success status
    #[error("Server responded with HTTP {status}")]
    HttpStatus { status: u16 },

    /// Worker pool queue was full and no lower-priority task could be evicted
    #[error("Worker pool saturated, request rejected")]
    PoolSaturated,

    /// Manager was shut down before the request could run
    #[error("Request engine has been shut down")]
    Shutdown,
}

/// Disk cache errors
#[derive(Error, Debug)]
pub enum CacheError {
    /// Cache directory not found or inaccessible
    #[error("Cache directory not accessible: {path}")]
    DirectoryNotAccessible { path: PathBuf },

    /// Invalid cache configuration
    #[error("Invalid cache configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Cache has not finished initialising
    #[error("Disk cache is not initialized")]
    NotInitialized,

    /// Cache has been closed
    #[error("Disk cache is closed")]
    Closed,

    /// Another editor holds the slot for this key
    #[error("Cache entry {key} is already being edited")]
    EditInProgress { key: String },

    /// Stored entry failed structural or checksum validation
    #[error("Cache entry corrupted: {reason}")]
    Corruption { reason: String },

    /// Entry metadata could not be encoded or decoded
    #[error("Cache metadata serialization failed")]
    Metadata(#[from] serde_json::Error),

    /// File I/O error
    #[error("Cache I/O error")]
    Io(#[from] std::io::Error),
}

/// Priority queue errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// Queue is at capacity
    #[error("Queue is full (capacity: {capacity})")]
    Full { capacity: usize },

    /// Queue has been closed
    #[error("Queue is closed")]
    Closed,
}

/// Worker pool errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    /// Submission rejected after the eviction retry
    #[error("Worker pool saturated (queue capacity {capacity}, {workers} workers)")]
    PoolSaturated { capacity: usize, workers: usize },

    /// Pool no longer accepts work
    #[error("Worker pool is shut down")]
    Shutdown,

    /// No tokio runtime was available to spawn workers
    #[error("No tokio runtime available: {0}")]
    NoRuntime(String),

    /// Invalid pool configuration
    #[error("Invalid worker pool configuration: {0}")]
    Configuration(String),
}

/// HTTP client construction errors
#[derive(Error, Debug)]
pub enum ClientError {
    /// reqwest refused the client configuration
    #[error("Failed to build HTTP client")]
    Build(#[from] reqwest::Error),

    /// Proxy definition could not be parsed
    #[error("Invalid proxy {proxy}: {reason}")]
    InvalidProxy { proxy: String, reason: String },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    NotFound { path: PathBuf },

    /// Invalid TOML
    #[error("Invalid configuration format")]
    InvalidFormat(#[from] toml::de::Error),

    /// Value out of range or inconsistent
    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    /// I/O error reading or writing the file
    #[error("Configuration I/O error")]
    Io(#[from] std::io::Error),
}

/// Top-level application error
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Request(#[from] RequestError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Worker(#[from] WorkerError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Generic error for other issues
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Create a generic error with a message
    pub fn generic<S: Into<String>>(message: S) -> Self {
        AppError::Generic(message.into())
    }

    /// Short category label used in logs and CLI output
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Transport(_) => "transport",
            AppError::Request(_) => "request",
            AppError::Cache(_) => "cache",
            AppError::Queue(_) => "queue",
            AppError::Worker(_) => "worker",
            AppError::Client(_) => "client",
            AppError::Config(_) => "configuration",
            AppError::Generic(_) => "generic",
        }
    }

    /// Whether retrying the operation later could succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            AppError::Transport(e) => e.is_retriable(),
            AppError::Request(RequestError::Transport(e)) => e.is_retriable(),
            AppError::Request(RequestError::HttpStatus { status }) => *status >= 500,
            AppError::Request(RequestError::PoolSaturated) => true,
            AppError::Request(RequestError::Shutdown) => false,
            AppError::Cache(CacheError::EditInProgress { .. }) => true,
            AppError::Cache(_) => false,
            AppError::Queue(QueueError::Full { .. }) => true,
            AppError::Queue(QueueError::Closed) => false,
            AppError::Worker(WorkerError::PoolSaturated { .. }) => true,
            AppError::Worker(_) => false,
            AppError::Client(_) | AppError::Config(_) | AppError::Generic(_) => false,
        }
    }
}

/// Result type aliases for convenience
pub type Result<T> = std::result::Result<T, AppError>;
pub type TransportResult<T> = std::result::Result<T, TransportError>;
pub type CacheResult<T> = std::result::Result<T, CacheError>;
pub type QueueResult<T> = std::result::Result<T, QueueError>;
pub type WorkerResult<T> = std::result::Result<T, WorkerError>;
pub type ClientResult<T> = std::result::Result<T, ClientError>;
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
