//! Disk-backed HTTP response cache
//!
//! Responses are stored per [`CacheKey`](crate::app::hash::CacheKey) in a
//! size-bounded directory. An append-only journal records commits, reads and
//! removals so the least recently used entries can be evicted after a
//! restart without scanning every file.
//!
//! # Key Features
//!
//! - **Atomic writes**: editors write a temp file that becomes visible only on commit
//! - **Fail-soft reads**: damaged or foreign entry files read as misses and are removed
//! - **LRU eviction**: committed entries are trimmed to `max_size` bytes
//! - **Header-driven freshness**: `Cache-Control`, `Expires` and `Date` decide the TTLs
//!
//! # Module Organization
//!
//! - [`config`] - Configuration types and defaults
//! - [`entry`] - Cache entries and their file format
//! - [`headers`] - TTL computation from response headers
//! - [`journal`] - Journal replay and LRU bookkeeping
//! - [`manager`] - The cache itself and its editors
//! - [`stats`] - Usage statistics
//!
//! # Examples
//!
//! ```rust,no_run
//! use httpkit::app::cache::{parse_cache_headers, now_millis, CacheConfig, DiskCache};
//! use httpkit::app::hash::CacheKey;
//! use httpkit::app::models::Headers;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = DiskCache::new(CacheConfig::default())?;
//! cache.initialize().await?;
//!
//! let headers: Headers = [("Cache-Control", "max-age=60")].into_iter().collect();
//! let mut entry = parse_cache_headers(&headers, now_millis());
//! entry.data = b"hello".to_vec();
//!
//! let key = CacheKey::for_url("https://example.com/hello");
//! cache.put(&key, &entry).await?;
//! assert_eq!(cache.get(&key).await.map(|e| e.data), Some(b"hello".to_vec()));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod entry;
pub mod headers;
pub(crate) mod journal;
pub mod manager;
pub mod stats;

#[cfg(test)]
mod tests;

pub use config::CacheConfig;
pub use entry::{now_millis, CacheEntry};
pub use headers::{apply_cache_timeout, parse_cache_headers, parse_http_date};
pub use manager::{CacheEditor, DiskCache};
pub use stats::{format_bytes, CacheStats};
