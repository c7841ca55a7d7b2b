//! Priority worker pool
//!
//! Workers are tokio tasks pulling from a shared [`PriorityTaskQueue`].
//! Submission follows the classic executor policy: start a core worker if
//! below the core size, otherwise queue the task, otherwise start a surplus
//! worker up to the maximum. When all of that fails the lowest-priority queued
//! task is evicted (if it does not outrank the newcomer) and the queue offer is
//! retried once before the submission is refused with `PoolSaturated`.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::app::queue::{PriorityTaskQueue, Rejected};
use crate::errors::{QueueError, WorkerError, WorkerResult};

use super::config::WorkerConfig;
use super::stats::{PoolCounters, PoolStats};
use super::types::{FnTask, PriorityTask, QueuedTask, TaskHandle};

/// Current state of the worker pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PoolState {
    /// Accepting and running tasks
    Running,
    /// No new tasks; queued tasks still run
    ShuttingDown,
    /// No new tasks; queue closed
    Shutdown,
}

/// Pool of tokio workers fed by a bounded priority queue
///
/// Dropping the pool closes the queue; workers finish what is queued and exit.
#[derive(Debug)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

#[derive(Debug)]
struct PoolInner {
    config: WorkerConfig,
    queue: PriorityTaskQueue<QueuedTask>,
    runtime: Handle,
    live: AtomicUsize,
    idle: AtomicUsize,
    next_id: AtomicU64,
    state: Mutex<PoolState>,
    running: Mutex<HashMap<u64, TaskHandle>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    counters: PoolCounters,
}

impl WorkerPool {
    /// Create a pool bound to the current tokio runtime
    pub fn new(config: WorkerConfig) -> WorkerResult<Self> {
        let runtime = Handle::try_current().map_err(|e| WorkerError::NoRuntime(e.to_string()))?;
        Self::with_runtime(config, runtime)
    }

    /// Create a pool that spawns its workers on `runtime`
    pub fn with_runtime(config: WorkerConfig, runtime: Handle) -> WorkerResult<Self> {
        config.validate()?;

        info!(
            "Creating worker pool: {} core / {} max workers, queue capacity {}",
            config.core_workers, config.max_workers, config.queue_capacity
        );

        Ok(Self {
            inner: Arc::new(PoolInner {
                queue: PriorityTaskQueue::new(config.queue_capacity),
                config,
                runtime,
                live: AtomicUsize::new(0),
                idle: AtomicUsize::new(0),
                next_id: AtomicU64::new(1),
                state: Mutex::new(PoolState::Running),
                running: Mutex::new(HashMap::new()),
                workers: Mutex::new(Vec::new()),
                counters: PoolCounters::default(),
            }),
        })
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.inner.config
    }

    pub fn state(&self) -> PoolState {
        *self.inner.state.lock()
    }

    /// Start all core workers ahead of the first submission
    pub fn prestart_core_workers(&self) -> usize {
        let mut started = 0;
        while self.inner.reserve_worker_slot(self.inner.config.core_workers) {
            self.inner.spawn_worker(None);
            started += 1;
        }
        started
    }

    /// Submit a plain future at normal priority
    pub fn spawn<F>(&self, future: F) -> WorkerResult<TaskHandle>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.submit(Box::new(FnTask::new(future)))
    }

    /// Submit a task with a fresh cancellation token
    pub fn submit(&self, task: Box<dyn PriorityTask>) -> WorkerResult<TaskHandle> {
        self.submit_with_token(task, CancellationToken::new())
    }

    /// Submit a task whose handle cancels `token`
    pub fn submit_with_token(
        &self,
        task: Box<dyn PriorityTask>,
        token: CancellationToken,
    ) -> WorkerResult<TaskHandle> {
        if self.state() != PoolState::Running {
            return Err(WorkerError::Shutdown);
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = TaskHandle::new(id, task.priority(), token);
        let queued = QueuedTask {
            handle: handle.clone(),
            task,
        };

        self.inner.execute(queued)?;
        PoolCounters::incr(&self.inner.counters.submitted);
        debug!("Accepted task {} with priority {}", id, handle.priority());
        Ok(handle)
    }

    /// Pull a still-queued task out of the queue and discard it now
    ///
    /// Returns false when the task has already been taken by a worker.
    pub fn cancel_queued(&self, handle: &TaskHandle) -> bool {
        let id = handle.id();
        match self.inner.queue.remove_where(|q| q.handle.id() == id) {
            Some(queued) => {
                PoolCounters::incr(&self.inner.counters.cancelled);
                debug!("Removed cancelled task {} from queue", id);
                discard(queued);
                true
            }
            None => false,
        }
    }

    /// Stop accepting work, let queued tasks finish, and wait for workers
    pub async fn shutdown(&self) {
        {
            let mut state = self.inner.state.lock();
            if *state == PoolState::Running {
                *state = PoolState::ShuttingDown;
            }
        }
        info!("Shutting down worker pool");
        self.inner.queue.close();

        let handles: Vec<_> = std::mem::take(&mut *self.inner.workers.lock());
        let mut failures = 0;
        for handle in handles {
            if let Err(e) = handle.await {
                debug!("Worker ended abnormally: {}", e);
                failures += 1;
            }
        }
        if failures > 0 {
            warn!("{} workers ended abnormally during shutdown", failures);
        }

        *self.inner.state.lock() = PoolState::Shutdown;
        info!("Worker pool shutdown complete");
    }

    /// Cancel running tasks and discard everything still queued
    ///
    /// Returns the number of queued tasks that never ran.
    pub fn shutdown_now(&self) -> usize {
        *self.inner.state.lock() = PoolState::Shutdown;
        self.inner.queue.close();

        let drained = self.inner.queue.drain();
        let count = drained.len();
        for queued in drained {
            PoolCounters::incr(&self.inner.counters.cancelled);
            discard(queued);
        }

        let running: Vec<TaskHandle> = self.inner.running.lock().values().cloned().collect();
        for handle in &running {
            handle.cancel();
        }

        info!(
            "Worker pool stopped: {} queued tasks discarded, {} running tasks cancelled",
            count,
            running.len()
        );
        count
    }

    /// Snapshot of pool counters
    pub fn stats(&self) -> PoolStats {
        PoolStats::from_counters(
            &self.inner.counters,
            self.state(),
            self.inner.live.load(Ordering::SeqCst),
            self.inner.idle.load(Ordering::SeqCst),
            self.inner.queue.len(),
            self.inner.queue.capacity(),
            self.inner.running.lock().len(),
        )
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.inner.queue.close();
    }
}

fn discard(queued: QueuedTask) {
    let QueuedTask { handle, task } = queued;
    handle.abandon();
    task.discard();
}

impl PoolInner {
    fn execute(self: &Arc<Self>, queued: QueuedTask) -> WorkerResult<()> {
        if self.reserve_worker_slot(self.config.core_workers) {
            self.spawn_worker(Some(queued));
            return Ok(());
        }

        let queued = match self.queue.offer(queued) {
            Ok(()) => {
                if self.live.load(Ordering::SeqCst) == 0
                    && self.reserve_worker_slot(self.config.max_workers)
                {
                    self.spawn_worker(None);
                }
                return Ok(());
            }
            Err(Rejected {
                item,
                error: QueueError::Closed,
            }) => {
                item.handle.abandon();
                return Err(WorkerError::Shutdown);
            }
            Err(Rejected { item, .. }) => item,
        };

        if self.reserve_worker_slot(self.config.max_workers) {
            self.spawn_worker(Some(queued));
            return Ok(());
        }

        self.reject(queued)
    }

    /// Rejection policy: evict one queued task that does not outrank the
    /// newcomer, then offer once more
    fn reject(self: &Arc<Self>, queued: QueuedTask) -> WorkerResult<()> {
        let priority = queued.handle.priority();
        let queued = match self.queue.evict_for(priority) {
            Some(evicted) => {
                PoolCounters::incr(&self.counters.evicted);
                debug!(
                    "Evicted queued task {} (priority {}) for incoming priority {}",
                    evicted.handle.id(),
                    evicted.handle.priority(),
                    priority
                );
                discard(evicted);

                match self.queue.offer(queued) {
                    Ok(()) => return Ok(()),
                    Err(rejected) => rejected.item,
                }
            }
            None => queued,
        };

        PoolCounters::incr(&self.counters.rejected);
        warn!(
            "Worker pool saturated, rejecting task with priority {} ({} queued, {} workers)",
            priority,
            self.queue.len(),
            self.live.load(Ordering::SeqCst)
        );
        queued.handle.abandon();
        drop(queued);

        Err(WorkerError::PoolSaturated {
            capacity: self.queue.capacity(),
            workers: self.live.load(Ordering::SeqCst),
        })
    }

    fn reserve_worker_slot(&self, limit: usize) -> bool {
        self.live
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < limit).then_some(n + 1)
            })
            .is_ok()
    }

    fn spawn_worker(self: &Arc<Self>, first: Option<QueuedTask>) {
        PoolCounters::incr(&self.counters.workers_started);
        let inner = Arc::clone(self);
        let join = self.runtime.spawn(async move { inner.run_worker(first).await });

        let mut workers = self.workers.lock();
        workers.retain(|h| !h.is_finished());
        workers.push(join);
    }

    async fn run_worker(self: Arc<Self>, mut first: Option<QueuedTask>) {
        debug!(
            "Worker started ({} live)",
            self.live.load(Ordering::SeqCst)
        );
        loop {
            let next = match first.take() {
                Some(task) => task,
                None => match self.next_task().await {
                    Some(task) => task,
                    None => break,
                },
            };
            self.run_task(next).await;
        }
        debug!(
            "Worker exiting ({} live)",
            self.live.load(Ordering::SeqCst)
        );
    }

    /// Wait for the next task; `None` means this worker should exit and has
    /// already given up its slot
    async fn next_task(&self) -> Option<QueuedTask> {
        loop {
            let timed = self.config.allow_core_timeout
                || self.live.load(Ordering::SeqCst) > self.config.core_workers;

            self.idle.fetch_add(1, Ordering::SeqCst);
            let next = if timed {
                tokio::time::timeout(self.config.keep_alive, self.queue.take())
                    .await
                    .ok()
            } else {
                Some(self.queue.take().await)
            };
            self.idle.fetch_sub(1, Ordering::SeqCst);

            match next {
                Some(Some(task)) => return Some(task),
                Some(None) => {
                    self.live.fetch_sub(1, Ordering::SeqCst);
                    return None;
                }
                None => {
                    let floor = if self.config.allow_core_timeout {
                        0
                    } else {
                        self.config.core_workers
                    };
                    let exited = self
                        .live
                        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                            (n > floor && (n > 1 || self.queue.is_empty())).then(|| n - 1)
                        })
                        .is_ok();
                    if exited {
                        return None;
                    }
                }
            }
        }
    }

    async fn run_task(&self, queued: QueuedTask) {
        let QueuedTask { handle, task } = queued;
        let id = handle.id();

        if !handle.begin() {
            debug!("Discarding task {} cancelled while queued", id);
            PoolCounters::incr(&self.counters.cancelled);
            handle.abandon();
            task.discard();
            return;
        }

        self.running.lock().insert(id, handle.clone());
        let outcome = AssertUnwindSafe(task.run()).catch_unwind().await;
        self.running.lock().remove(&id);

        if outcome.is_err() {
            PoolCounters::incr(&self.counters.panicked);
            error!("Task {} panicked", id);
        }
        PoolCounters::incr(&self.counters.completed);
        handle.complete();
    }
}
