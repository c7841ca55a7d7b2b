//! Queue counters

use serde::Serialize;

/// Snapshot of priority queue activity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Elements currently queued
    pub queued: usize,
    /// Maximum number of queued elements
    pub capacity: usize,
    /// Successful offers
    pub offered: u64,
    /// Offers refused because the queue was full
    pub rejected: u64,
    /// Elements removed by a consumer
    pub taken: u64,
    /// Elements removed by lowest-priority eviction
    pub evicted: u64,
}

impl QueueStats {
    /// Fraction of capacity in use, 0.0 to 1.0
    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        self.queued as f64 / self.capacity as f64
    }
}
