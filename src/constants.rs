//! Application constants for httpkit
//!
//! This module centralizes the constants used throughout the request engine,
//! organized by functional domain.

use std::time::Duration;

/// Synthetic status codes and HTTP protocol constants
pub mod http {
    use super::Duration;

    /// Status reported for a fresh cache hit served without a network call
    pub const STATUS_LOCAL: i32 = -1;

    /// Status reported for a stale cache hit, followed by a live fetch
    pub const STATUS_LOCAL_EXPIRED: i32 = -2;

    /// Default user agent for all requests
    pub const USER_AGENT: &str = concat!("httpkit/", env!("CARGO_PKG_VERSION"));

    /// Default content type for form-encoded POST bodies
    pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=UTF-8";

    /// Default connect timeout
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Default socket (read) timeout
    pub const SOCKET_TIMEOUT: Duration = Duration::from_secs(10);

    /// Connection pool idle timeout for the shared client
    pub const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

    /// Maximum idle connections per host for the shared client
    pub const POOL_MAX_PER_HOST: usize = 8;

    /// Maximum number of redirects to follow
    pub const MAX_REDIRECTS: usize = 10;
}

/// Retry policy defaults
pub mod limits {
    use super::Duration;

    /// Default maximum number of retries after the first attempt
    pub const DEFAULT_MAX_RETRIES: u32 = 5;

    /// Sleep between retry attempts
    pub const RETRY_SLEEP: Duration = Duration::from_millis(1500);

    /// Jitter factor applied to the retry sleep (0.0-1.0)
    pub const RETRY_JITTER_FACTOR: f64 = 0.1;
}

/// Request priority levels
pub mod priority {
    pub const LOW: i32 = 1;
    pub const NORMAL: i32 = 5;
    pub const HIGH: i32 = 8;
    pub const IMMEDIATE: i32 = 10;
}

/// Worker pool sizing, scaled by available cores
pub mod workers {
    use super::Duration;

    /// Core workers per CPU core
    pub const CORE_WORKERS_PER_CPU: usize = 3;

    /// Maximum workers per CPU core
    pub const MAX_WORKERS_PER_CPU: usize = 50;

    /// Keep-alive for idle non-core workers, per CPU core
    pub const KEEP_ALIVE_PER_CPU: Duration = Duration::from_secs(1);

    /// Queue slots per CPU core
    pub const QUEUE_CAPACITY_PER_CPU: usize = 10;

    /// Queue capacity for fixed and single-worker pools
    pub const LARGE_QUEUE_CAPACITY: usize = 4096;

    /// Keep-alive for idle workers of a cached pool
    pub const CACHED_KEEP_ALIVE: Duration = Duration::from_secs(60);

    /// Number of CPU cores, falling back to one
    pub fn cpu_count() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

/// Disk cache constants
pub mod cache {
    /// Default maximum size of the disk cache in bytes
    pub const DEFAULT_MAX_SIZE: u64 = 10 * 1024 * 1024;

    /// Application directory name under the user cache directory
    pub const APP_DIR_NAME: &str = "httpkit";

    /// Sub-directory holding HTTP response entries
    pub const HTTP_DIR_NAME: &str = "http";

    /// Journal file name
    pub const JOURNAL_FILE: &str = "journal";

    /// Temporary journal used while compacting
    pub const JOURNAL_TMP_FILE: &str = "journal.tmp";

    /// Magic line at the top of every journal
    pub const JOURNAL_MAGIC: &str = "httpkit.DiskCache";

    /// Journal format version
    pub const JOURNAL_VERSION: u32 = 1;

    /// Redundant journal operations tolerated before compaction
    pub const JOURNAL_COMPACT_THRESHOLD: usize = 2000;

    /// Extension of committed entry files
    pub const ENTRY_EXTENSION: &str = "entry";

    /// Extension of entry files being written
    pub const TEMP_EXTENSION: &str = "tmp";

    /// Magic prefix of every entry file
    pub const ENTRY_MAGIC: &[u8; 4] = b"HKC1";
}

/// Callback dispatcher constants
pub mod dispatch {
    /// Name of the dedicated callback delivery thread
    pub const THREAD_NAME: &str = "httpkit-callbacks";
}

/// Configuration file names
pub mod config {
    /// Project-local configuration file
    pub const LOCAL_FILE: &str = "httpkit.toml";

    /// Directory under the user config directory
    pub const APP_DIR_NAME: &str = "httpkit";

    /// File name inside the user config directory
    pub const USER_FILE: &str = "config.toml";
}

// Re-export commonly used constants at module level
pub use http::{STATUS_LOCAL, STATUS_LOCAL_EXPIRED, USER_AGENT};
pub use limits::DEFAULT_MAX_RETRIES;
