//! Worker pool configuration
//!
//! Pool sizes are scaled by the number of available cores. Presets cover the
//! usual executor shapes: an elastic pool for request traffic, fixed and
//! single-worker pools, and a cached pool that grows on demand.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::workers;
use crate::errors::{WorkerError, WorkerResult};

/// Configuration for a [`WorkerPool`](super::WorkerPool)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Workers kept alive even when idle (unless `allow_core_timeout`)
    pub core_workers: usize,
    /// Upper bound on live workers
    pub max_workers: usize,
    /// How long a surplus worker waits for work before exiting
    #[serde(with = "humantime_serde")]
    pub keep_alive: Duration,
    /// Let core workers exit after `keep_alive` as well
    pub allow_core_timeout: bool,
    /// Capacity of the priority queue
    pub queue_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        ConfigPresets::elastic()
    }
}

impl WorkerConfig {
    /// Validate configuration values
    pub fn validate(&self) -> WorkerResult<()> {
        if self.max_workers == 0 {
            return Err(WorkerError::Configuration(
                "max_workers must be greater than 0".to_string(),
            ));
        }
        if self.core_workers > self.max_workers {
            return Err(WorkerError::Configuration(format!(
                "core_workers ({}) cannot exceed max_workers ({})",
                self.core_workers, self.max_workers
            )));
        }
        if self.queue_capacity == 0 {
            return Err(WorkerError::Configuration(
                "queue_capacity must be greater than 0".to_string(),
            ));
        }
        if self.keep_alive.is_zero() && (self.allow_core_timeout || self.max_workers > self.core_workers) {
            return Err(WorkerError::Configuration(
                "keep_alive must be non-zero when workers can time out".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_core_workers(mut self, core_workers: usize) -> Self {
        self.core_workers = core_workers;
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn with_allow_core_timeout(mut self, allow: bool) -> Self {
        self.allow_core_timeout = allow;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }
}

/// Configuration presets for different executor shapes
pub struct ConfigPresets;

impl ConfigPresets {
    /// Default request pool: 3 core and 50 max workers per core, 10 queue slots per core
    pub fn elastic() -> WorkerConfig {
        let cpus = workers::cpu_count();
        WorkerConfig {
            core_workers: workers::CORE_WORKERS_PER_CPU * cpus,
            max_workers: workers::MAX_WORKERS_PER_CPU * cpus,
            keep_alive: workers::KEEP_ALIVE_PER_CPU * cpus as u32,
            allow_core_timeout: true,
            queue_capacity: workers::QUEUE_CAPACITY_PER_CPU * cpus,
        }
    }

    /// Exactly `workers` workers that never time out
    pub fn fixed(workers: usize) -> WorkerConfig {
        let workers = workers.max(1);
        WorkerConfig {
            core_workers: workers,
            max_workers: workers,
            keep_alive: Duration::ZERO,
            allow_core_timeout: false,
            queue_capacity: crate::constants::workers::LARGE_QUEUE_CAPACITY,
        }
    }

    /// One worker, tasks run strictly in priority order
    pub fn single() -> WorkerConfig {
        Self::fixed(1)
    }

    /// No core workers; grows on demand and shrinks after a minute idle
    pub fn cached() -> WorkerConfig {
        WorkerConfig {
            core_workers: 0,
            max_workers: workers::MAX_WORKERS_PER_CPU * workers::cpu_count(),
            keep_alive: workers::CACHED_KEEP_ALIVE,
            allow_core_timeout: false,
            queue_capacity: 1,
        }
    }

    /// Small pool with short timeouts for tests
    pub fn testing() -> WorkerConfig {
        WorkerConfig {
            core_workers: 2,
            max_workers: 4,
            keep_alive: Duration::from_millis(50),
            allow_core_timeout: false,
            queue_capacity: 8,
        }
    }
}
