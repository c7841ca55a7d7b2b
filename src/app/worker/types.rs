//! Task and handle types for the worker pool

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::app::queue::Prioritized;
use crate::constants::priority;

/// A unit of work the pool can schedule
///
/// Every task handed to the pool is either run or discarded, exactly once.
/// Tasks are discarded when they are evicted from a full queue, cancelled
/// before a worker picks them up, or drained by `shutdown_now`.
pub trait PriorityTask: Send + 'static {
    /// Scheduling priority; higher runs first
    fn priority(&self) -> i32 {
        priority::NORMAL
    }

    /// Consume the task and produce the work to run on a worker
    fn run(self: Box<Self>) -> BoxFuture<'static, ()>;

    /// Called instead of `run` when the task will never execute
    fn discard(self: Box<Self>) {}
}

/// Adapter running a plain future at a fixed priority
pub struct FnTask<F> {
    priority: i32,
    future: F,
}

impl<F> FnTask<F>
where
    F: Future<Output = ()> + Send + 'static,
{
    pub fn new(future: F) -> Self {
        Self::with_priority(priority::NORMAL, future)
    }

    pub fn with_priority(priority: i32, future: F) -> Self {
        Self { priority, future }
    }
}

impl<F> PriorityTask for FnTask<F>
where
    F: Future<Output = ()> + Send + 'static,
{
    fn priority(&self) -> i32 {
        self.priority
    }

    fn run(self: Box<Self>) -> BoxFuture<'static, ()> {
        Box::pin(self.future)
    }
}

/// Lifecycle of a submitted task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TaskState {
    Pending,
    Running,
    Done,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Done | TaskState::Cancelled)
    }
}

struct TaskShared {
    id: u64,
    priority: i32,
    state: Mutex<TaskState>,
    token: CancellationToken,
    settled: watch::Sender<bool>,
}

/// Caller-side view of a submitted task
///
/// Cloning is cheap; all clones observe and control the same task.
#[derive(Clone)]
pub struct TaskHandle {
    shared: Arc<TaskShared>,
}

impl TaskHandle {
    pub(crate) fn new(id: u64, priority: i32, token: CancellationToken) -> Self {
        let (settled, _) = watch::channel(false);
        Self {
            shared: Arc::new(TaskShared {
                id,
                priority,
                state: Mutex::new(TaskState::Pending),
                token,
                settled,
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn priority(&self) -> i32 {
        self.shared.priority
    }

    pub fn state(&self) -> TaskState {
        *self.shared.state.lock()
    }

    /// Token cancelled when this task is cancelled
    pub fn token(&self) -> &CancellationToken {
        &self.shared.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == TaskState::Cancelled
    }

    /// Request cancellation; returns false if the task already completed
    ///
    /// Pending tasks are discarded when a worker reaches them. Running tasks
    /// observe the cancellation token at their next check.
    pub fn cancel(&self) -> bool {
        let cancelled = {
            let mut state = self.shared.state.lock();
            match *state {
                TaskState::Pending | TaskState::Running => {
                    *state = TaskState::Cancelled;
                    true
                }
                TaskState::Done | TaskState::Cancelled => false,
            }
        };
        if cancelled {
            self.shared.token.cancel();
        }
        cancelled
    }

    /// Wait until the pool has run or discarded the task
    pub async fn settled(&self) {
        let mut rx = self.shared.settled.subscribe();
        let _ = rx.wait_for(|settled| *settled).await;
    }

    pub fn is_settled(&self) -> bool {
        *self.shared.settled.borrow()
    }

    /// Pending -> Running; false when the task was cancelled first
    pub(crate) fn begin(&self) -> bool {
        let mut state = self.shared.state.lock();
        if *state == TaskState::Pending {
            *state = TaskState::Running;
            true
        } else {
            false
        }
    }

    /// Running -> Done, leaving a cancelled state in place
    pub(crate) fn complete(&self) {
        {
            let mut state = self.shared.state.lock();
            if *state == TaskState::Running {
                *state = TaskState::Done;
            }
        }
        self.settle();
    }

    /// Mark a task that will never run
    pub(crate) fn abandon(&self) {
        {
            let mut state = self.shared.state.lock();
            if !state.is_terminal() {
                *state = TaskState::Cancelled;
            }
        }
        self.shared.token.cancel();
        self.settle();
    }

    fn settle(&self) {
        self.shared.settled.send_replace(true);
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id())
            .field("priority", &self.priority())
            .field("state", &self.state())
            .finish()
    }
}

/// A task waiting in the pool queue together with its handle
pub(crate) struct QueuedTask {
    pub(crate) handle: TaskHandle,
    pub(crate) task: Box<dyn PriorityTask>,
}

impl Prioritized for QueuedTask {
    fn priority(&self) -> i32 {
        self.handle.priority()
    }
}

impl fmt::Debug for QueuedTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedTask")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}
