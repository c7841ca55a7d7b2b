//! Cache statistics
//!
//! Hit/miss/write counters are kept in atomics on the cache itself and
//! combined with the index totals into a [`CacheStats`] snapshot on demand.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of disk cache usage
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    /// Cache directory
    pub directory: PathBuf,
    /// Whether the on-disk index has been opened
    pub ready: bool,
    /// Number of committed entries
    pub entry_count: usize,
    /// Total size of committed entries in bytes
    pub total_size: u64,
    /// Configured size bound in bytes
    pub max_size: u64,
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    /// Entries dropped to stay under `max_size`
    pub evictions: u64,
    /// Entries discarded because they failed validation
    pub corrupt_entries: u64,
}

impl CacheStats {
    /// Fraction of lookups served from disk
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            return 0.0;
        }
        self.hits as f64 / lookups as f64
    }

    /// Size usage as a percentage of `max_size`
    pub fn usage_percentage(&self) -> f64 {
        if self.max_size == 0 {
            return 0.0;
        }
        (self.total_size as f64 / self.max_size as f64) * 100.0
    }

    /// Format cache size in human-readable format
    pub fn format_cache_size(&self) -> String {
        format_bytes(self.total_size)
    }

    /// Format the size bound in human-readable format
    pub fn format_max_size(&self) -> String {
        format_bytes(self.max_size)
    }
}

#[derive(Debug, Default)]
pub(crate) struct CacheCounters {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub writes: AtomicU64,
    pub evictions: AtomicU64,
    pub corrupt_entries: AtomicU64,
}

impl CacheCounters {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn load(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

/// Format bytes in human-readable format
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: u64 = 1024;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= THRESHOLD as f64 && unit_index < UNITS.len() - 1 {
        size /= THRESHOLD as f64;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.2} {}", size, UNITS[unit_index])
    }
}
