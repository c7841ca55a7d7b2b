//! Worker pool statistics
//!
//! Counters are plain atomics updated on the submit and worker paths; a
//! [`PoolStats`] snapshot is assembled on demand.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use super::pool::PoolState;

/// Live counters shared by the pool and its workers
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    pub submitted: AtomicU64,
    pub completed: AtomicU64,
    pub rejected: AtomicU64,
    pub evicted: AtomicU64,
    pub cancelled: AtomicU64,
    pub panicked: AtomicU64,
    pub workers_started: AtomicU64,
}

impl PoolCounters {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn load(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

/// Snapshot of worker pool activity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolStats {
    pub state: PoolState,
    pub live_workers: usize,
    pub idle_workers: usize,
    pub queued: usize,
    pub queue_capacity: usize,
    pub running: usize,
    /// Tasks accepted by `submit`
    pub submitted: u64,
    /// Tasks that ran to completion (including panicked ones)
    pub completed: u64,
    /// Submissions refused with `PoolSaturated`
    pub rejected: u64,
    /// Queued tasks discarded to make room for new work
    pub evicted: u64,
    /// Tasks discarded because they were cancelled or drained
    pub cancelled: u64,
    pub panicked: u64,
    pub workers_started: u64,
}

impl PoolStats {
    pub(crate) fn from_counters(
        counters: &PoolCounters,
        state: PoolState,
        live_workers: usize,
        idle_workers: usize,
        queued: usize,
        queue_capacity: usize,
        running: usize,
    ) -> Self {
        Self {
            state,
            live_workers,
            idle_workers,
            queued,
            queue_capacity,
            running,
            submitted: PoolCounters::load(&counters.submitted),
            completed: PoolCounters::load(&counters.completed),
            rejected: PoolCounters::load(&counters.rejected),
            evicted: PoolCounters::load(&counters.evicted),
            cancelled: PoolCounters::load(&counters.cancelled),
            panicked: PoolCounters::load(&counters.panicked),
            workers_started: PoolCounters::load(&counters.workers_started),
        }
    }

    /// Tasks accepted but not yet run or discarded
    pub fn outstanding(&self) -> u64 {
        self.submitted
            .saturating_sub(self.completed + self.evicted + self.cancelled)
    }

    /// One-line summary for logs and the CLI
    pub fn summary(&self) -> String {
        format!(
            "{:?}: {} workers ({} idle), {} running, {}/{} queued, {} done, {} rejected, {} evicted, {} cancelled",
            self.state,
            self.live_workers,
            self.idle_workers,
            self.running,
            self.queued,
            self.queue_capacity,
            self.completed,
            self.rejected,
            self.evicted,
            self.cancelled
        )
    }
}
