//! Bounded priority blocking queue
//!
//! Elements are ordered by descending priority. Elements with the same
//! priority leave in insertion order. `offer` never waits; `take` and `poll`
//! wait for an element or for the queue to close.

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, trace};

use crate::constants::workers;
use crate::errors::QueueError;

use super::stats::QueueStats;

/// Anything that carries an integer scheduling priority
pub trait Prioritized {
    /// Higher values are scheduled first
    fn priority(&self) -> i32;
}

/// An element the queue refused, handed back to the caller
#[derive(Debug)]
pub struct Rejected<T> {
    pub item: T,
    pub error: QueueError,
}

#[derive(Debug)]
struct QueueState<T> {
    buckets: BTreeMap<i32, VecDeque<T>>,
    len: usize,
    closed: bool,
    stats: QueueStats,
}

impl<T> QueueState<T> {
    fn pop_highest(&mut self) -> Option<T> {
        let mut entry = self.buckets.last_entry()?;
        let item = entry.get_mut().pop_front();
        if entry.get().is_empty() {
            entry.remove();
        }
        if item.is_some() {
            self.len -= 1;
        }
        item
    }

    fn pop_lowest(&mut self) -> Option<T> {
        let mut entry = self.buckets.first_entry()?;
        let item = entry.get_mut().pop_front();
        if entry.get().is_empty() {
            entry.remove();
        }
        if item.is_some() {
            self.len -= 1;
        }
        item
    }

    fn lowest_priority(&self) -> Option<i32> {
        self.buckets.keys().next().copied()
    }
}

/// Bounded priority queue shared between submitters and workers
#[derive(Debug)]
pub struct PriorityTaskQueue<T> {
    state: Mutex<QueueState<T>>,
    available: Notify,
    capacity: usize,
}

impl<T: Prioritized> PriorityTaskQueue<T> {
    /// Create a queue holding at most `capacity` elements
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                buckets: BTreeMap::new(),
                len: 0,
                closed: false,
                stats: QueueStats::default(),
            }),
            available: Notify::new(),
            capacity: capacity.max(1),
        }
    }

    /// Create a queue sized at `per_cpu` slots per available core
    pub fn scaled(per_cpu: usize) -> Self {
        Self::new(per_cpu * workers::cpu_count())
    }

    /// Insert without waiting; hands the element back when full or closed
    pub fn offer(&self, item: T) -> Result<(), Rejected<T>> {
        let priority = item.priority();
        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(Rejected {
                    item,
                    error: QueueError::Closed,
                });
            }
            if state.len >= self.capacity {
                state.stats.rejected += 1;
                return Err(Rejected {
                    item,
                    error: QueueError::Full {
                        capacity: self.capacity,
                    },
                });
            }
            state.buckets.entry(priority).or_default().push_back(item);
            state.len += 1;
            state.stats.offered += 1;
            trace!("Queued element with priority {} ({} queued)", priority, state.len);
        }
        self.available.notify_one();
        Ok(())
    }

    /// Remove the highest-priority element without waiting
    pub fn try_take(&self) -> Option<T> {
        let mut state = self.state.lock();
        let item = state.pop_highest();
        if item.is_some() {
            state.stats.taken += 1;
        }
        item
    }

    /// Wait for the highest-priority element
    ///
    /// Returns `None` once the queue is closed and empty.
    pub async fn take(&self) -> Option<T> {
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if let Some(item) = state.pop_highest() {
                    state.stats.taken += 1;
                    return Some(item);
                }
                if state.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Wait up to `timeout` for an element
    pub async fn poll(&self, timeout: Duration) -> Option<T> {
        tokio::time::timeout(timeout, self.take())
            .await
            .ok()
            .flatten()
    }

    /// Pop the lowest-priority element (earliest inserted among equals)
    ///
    /// `Some` means an element was removed.
    pub fn remove_lowest_priority(&self) -> Option<T> {
        let mut state = self.state.lock();
        let item = state.pop_lowest();
        if item.is_some() {
            state.stats.evicted += 1;
            debug!("Evicted lowest-priority element ({} left)", state.len);
        }
        item
    }

    /// Evict the lowest-priority element only if it does not outrank `priority`
    ///
    /// The comparison and the removal happen under one lock, so a concurrent
    /// offer cannot slip a lower element in between.
    pub fn evict_for(&self, priority: i32) -> Option<T> {
        let mut state = self.state.lock();
        match state.lowest_priority() {
            Some(lowest) if lowest <= priority => {
                let item = state.pop_lowest();
                if item.is_some() {
                    state.stats.evicted += 1;
                    debug!(
                        "Evicted element with priority {} for incoming priority {}",
                        lowest, priority
                    );
                }
                item
            }
            _ => None,
        }
    }

    /// Remove the first element matching `predicate`, highest priority first
    pub fn remove_where<F>(&self, mut predicate: F) -> Option<T>
    where
        F: FnMut(&T) -> bool,
    {
        let mut state = self.state.lock();
        let mut found: Option<(i32, usize)> = None;
        for (priority, bucket) in state.buckets.iter().rev() {
            if let Some(index) = bucket.iter().position(&mut predicate) {
                found = Some((*priority, index));
                break;
            }
        }

        let (priority, index) = found?;
        let bucket = state.buckets.get_mut(&priority)?;
        let item = bucket.remove(index);
        if bucket.is_empty() {
            state.buckets.remove(&priority);
        }
        if item.is_some() {
            state.len -= 1;
        }
        item
    }

    /// Remove every queued element, highest priority first
    pub fn drain(&self) -> Vec<T> {
        let mut state = self.state.lock();
        let mut drained = Vec::with_capacity(state.len);
        while let Some(item) = state.pop_highest() {
            drained.push(item);
        }
        drained
    }

    /// Stop accepting elements and wake every waiting consumer
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.available.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn len(&self) -> usize {
        self.state.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn remaining_capacity(&self) -> usize {
        self.capacity.saturating_sub(self.len())
    }

    /// Priority of the element `remove_lowest_priority` would pop
    pub fn lowest_priority(&self) -> Option<i32> {
        self.state.lock().lowest_priority()
    }

    /// Snapshot of queue counters
    pub fn stats(&self) -> QueueStats {
        let state = self.state.lock();
        QueueStats {
            queued: state.len,
            capacity: self.capacity,
            ..state.stats.clone()
        }
    }
}
