//! In-flight request deduplication
//!
//! The first request for a cache key enters and executes. Requests for the
//! same key arriving while it runs are parked in a per-key group. When the
//! owner finishes, its [`DedupGuard`] drops, the group is drained and every
//! parked request that was not cancelled is handed back for a fresh
//! execution, which normally finds the freshly written cache entry.
//!
//! Every marker carries a generation. Releasing a [`Claim`] only drains the
//! marker it created, so an owner that outlives [`RequestCoordinator::clear`]
//! cannot release a key that has since been claimed again.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::app::hash::CacheKey;

/// A parked request
pub trait Waiter: Send + 'static {
    fn is_cancelled(&self) -> bool;

    /// Cancellation group
    fn tag(&self) -> Option<&str>;
}

/// Ownership of one in-flight marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Claim {
    key: CacheKey,
    generation: u64,
}

impl Claim {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }
}

/// Outcome of [`RequestCoordinator::try_enter`]
#[derive(Debug)]
pub enum EnterResult<W> {
    /// No request for the key is in flight; the caller owns it now
    Enter(W, Claim),
    /// Parked behind the in-flight request
    Wait,
}

impl<W> EnterResult<W> {
    pub fn is_enter(&self) -> bool {
        matches!(self, EnterResult::Enter(..))
    }
}

struct Group<W> {
    generation: u64,
    waiters: Vec<W>,
}

struct Groups<W> {
    by_key: HashMap<CacheKey, Group<W>>,
    next_generation: u64,
}

/// Table of in-flight cache keys and their parked requests
pub struct RequestCoordinator<W> {
    groups: Mutex<Groups<W>>,
}

impl<W: Waiter> Default for RequestCoordinator<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Waiter> RequestCoordinator<W> {
    pub fn new() -> Self {
        Self {
            groups: Mutex::new(Groups {
                by_key: HashMap::new(),
                next_generation: 0,
            }),
        }
    }

    /// Claim `key` or park `waiter` behind its current owner
    pub fn try_enter(&self, key: &CacheKey, waiter: W) -> EnterResult<W> {
        let mut groups = self.groups.lock();
        if let Some(group) = groups.by_key.get_mut(key) {
            group.waiters.push(waiter);
            debug!(
                "Request for {} parked behind in-flight request ({} waiting)",
                key,
                group.waiters.len()
            );
            return EnterResult::Wait;
        }

        let generation = groups.next_generation;
        groups.next_generation += 1;
        groups.by_key.insert(
            *key,
            Group {
                generation,
                waiters: Vec::new(),
            },
        );
        EnterResult::Enter(waiter, Claim { key: *key, generation })
    }

    /// Release a claimed key, returning the parked requests that are still live
    ///
    /// A claim whose marker was already cleared releases nothing.
    pub fn finish(&self, claim: &Claim) -> Vec<W> {
        let waiters = {
            let mut groups = self.groups.lock();
            let current = groups.by_key.get(&claim.key).map(|group| group.generation);
            match current {
                Some(generation) if generation == claim.generation => groups
                    .by_key
                    .remove(&claim.key)
                    .map(|group| group.waiters)
                    .unwrap_or_default(),
                Some(_) => {
                    debug!("Stale claim on {} left the current owner in place", claim.key);
                    return Vec::new();
                }
                None => return Vec::new(),
            }
        };

        let total = waiters.len();
        let live: Vec<W> = waiters.into_iter().filter(|w| !w.is_cancelled()).collect();
        if total > 0 {
            debug!(
                "Released {}: resubmitting {} of {} parked requests",
                claim.key,
                live.len(),
                total
            );
        }
        live
    }

    /// Remove and return every parked request in group `tag`
    pub fn cancel_tag(&self, tag: Option<&str>) -> Vec<W> {
        let mut removed = Vec::new();
        let mut groups = self.groups.lock();
        for group in groups.by_key.values_mut() {
            let waiters = &mut group.waiters;
            let mut index = 0;
            while index < waiters.len() {
                if waiters[index].tag() == tag {
                    removed.push(waiters.remove(index));
                } else {
                    index += 1;
                }
            }
        }
        removed
    }

    /// Forget every in-flight key, returning all parked requests
    pub fn clear(&self) -> Vec<W> {
        let groups = std::mem::take(&mut self.groups.lock().by_key);
        groups.into_values().flat_map(|group| group.waiters).collect()
    }

    pub fn is_in_flight(&self, key: &CacheKey) -> bool {
        self.groups.lock().by_key.contains_key(key)
    }

    /// Number of keys currently owned by an executing request
    pub fn in_flight(&self) -> usize {
        self.groups.lock().by_key.len()
    }

    /// Number of requests parked behind `key`
    pub fn waiting(&self, key: &CacheKey) -> usize {
        self.groups
            .lock()
            .by_key
            .get(key)
            .map_or(0, |group| group.waiters.len())
    }
}

impl<W> fmt::Debug for RequestCoordinator<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let groups = self.groups.lock();
        f.debug_struct("RequestCoordinator")
            .field("in_flight", &groups.by_key.len())
            .field(
                "waiting",
                &groups.by_key.values().map(|g| g.waiters.len()).sum::<usize>(),
            )
            .finish()
    }
}

/// Ownership of an in-flight key; dropping it releases the key
///
/// The release callback receives each live parked request. The guard is
/// `Sync` so an executor holding one can be borrowed across await points.
pub struct DedupGuard {
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl DedupGuard {
    pub fn new<W, F>(coordinator: Arc<RequestCoordinator<W>>, claim: Claim, resubmit: F) -> Self
    where
        W: Waiter,
        F: Fn(W) + Send + Sync + 'static,
    {
        Self {
            release: Some(Box::new(move || {
                for waiter in coordinator.finish(&claim) {
                    resubmit(waiter);
                }
            })),
        }
    }

    /// Release now instead of on drop
    pub fn release(mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for DedupGuard {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for DedupGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DedupGuard")
            .field("held", &self.release.is_some())
            .finish()
    }
}
