//! Caller-side handle for a performed request

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::app::dispatch::{RequestSink, ResponseEvent};
use crate::app::hash::CacheKey;
use crate::app::worker::{TaskHandle, TaskState};
use crate::errors::RequestError;

/// Handle returned by [`HttpManager::perform_request`](super::HttpManager::perform_request)
///
/// Cloning is cheap. A handle exists from the moment the request is accepted,
/// even while it is parked behind a duplicate and has no pool task yet.
#[derive(Clone)]
pub struct RequestHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    id: u64,
    tag: Option<String>,
    key: CacheKey,
    token: CancellationToken,
    sink: RequestSink,
    task: Mutex<Option<TaskHandle>>,
}

impl RequestHandle {
    pub(crate) fn new(id: u64, tag: Option<String>, key: CacheKey, sink: RequestSink) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id,
                tag,
                key,
                token: CancellationToken::new(),
                sink,
                task: Mutex::new(None),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn tag(&self) -> Option<&str> {
        self.inner.tag.as_deref()
    }

    pub fn cache_key(&self) -> &CacheKey {
        &self.inner.key
    }

    /// Cancel the request
    ///
    /// The handler gets `Cancelled` right away unless the request already
    /// finished. Returns whether that notification was sent; repeated calls
    /// are harmless.
    pub fn cancel(&self) -> bool {
        let notified = self.inner.sink.send_cancel();
        self.inner.token.cancel();
        if let Some(task) = self.inner.task.lock().as_ref() {
            task.cancel();
        }
        notified
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// True once the handler has received `Finished` or `Cancelled`
    pub fn is_finished(&self) -> bool {
        self.inner.sink.is_settled()
    }

    /// State of the pool task, `None` while parked or before submission
    pub fn task_state(&self) -> Option<TaskState> {
        self.inner.task.lock().as_ref().map(TaskHandle::state)
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.inner.token
    }

    pub(crate) fn sink(&self) -> &RequestSink {
        &self.inner.sink
    }

    pub(crate) fn task(&self) -> Option<TaskHandle> {
        self.inner.task.lock().clone()
    }

    /// Bind the pool task running this request
    pub(crate) fn attach(&self, task: TaskHandle) {
        let mut slot = self.inner.task.lock();
        if self.inner.token.is_cancelled() {
            task.cancel();
        }
        *slot = Some(task);
    }

    /// Report a request that never reached a worker
    ///
    /// Still opens with `Started` so start and finish callbacks pair up.
    pub(crate) fn fail(&self, error: RequestError) {
        self.inner.sink.send(ResponseEvent::Started);
        self.inner.sink.send(ResponseEvent::failure(error));
        self.inner.sink.send(ResponseEvent::Finished);
    }
}

impl fmt::Debug for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestHandle")
            .field("id", &self.inner.id)
            .field("tag", &self.inner.tag)
            .field("key", &self.inner.key)
            .field("cancelled", &self.is_cancelled())
            .field("finished", &self.is_finished())
            .finish()
    }
}
