//! Manager statistics

use crate::app::cache::CacheStats;
use crate::app::worker::PoolStats;

/// Snapshot of the whole request engine
#[derive(Debug, Clone, PartialEq)]
pub struct ManagerStats {
    pub pool: PoolStats,
    /// `None` when running without a disk cache
    pub cache: Option<CacheStats>,
    /// Cache keys with a request currently executing
    pub in_flight_keys: usize,
    /// Requests still tracked for tag cancellation
    pub tracked_requests: usize,
    /// Clients built for non-default request settings
    pub dedicated_clients: usize,
}

impl ManagerStats {
    /// Multi-line summary for logs and the CLI
    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!("pool: {}", self.pool.summary()),
            format!(
                "requests: {} tracked, {} keys in flight, {} dedicated clients",
                self.tracked_requests, self.in_flight_keys, self.dedicated_clients
            ),
        ];
        match &self.cache {
            Some(cache) => lines.push(format!(
                "cache: {} entries, {} of {} ({:.1}%), hit rate {:.1}%",
                cache.entry_count,
                cache.format_cache_size(),
                cache.format_max_size(),
                cache.usage_percentage(),
                cache.hit_rate() * 100.0
            )),
            None => lines.push("cache: disabled".to_string()),
        }
        lines.join("\n")
    }
}
