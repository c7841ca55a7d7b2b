//! The request manager context

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::app::cache::DiskCache;
use crate::app::client::{ClientRegistry, ReqwestTransportFactory, TransportFactory};
use crate::app::coordinator::{Claim, DedupGuard, EnterResult, RequestCoordinator, Waiter};
use crate::app::dispatch::{
    CallbackDispatcher, ChannelHandler, RequestSink, ResponseEvent, ResponseHandler,
};
use crate::app::executor::AsyncRequestExecutor;
use crate::app::models::Request;
use crate::app::worker::WorkerPool;
use crate::errors::{RequestError, Result, TransportError, WorkerError};

use super::config::ManagerConfig;
use super::handle::RequestHandle;
use super::stats::ManagerStats;

/// Entry point of the request engine
///
/// Construct one per process and pass clones to whoever performs requests.
/// All clones share the same worker pool, disk cache, callback thread and
/// cancellation bookkeeping.
#[derive(Clone)]
pub struct HttpManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    config: ManagerConfig,
    pool: WorkerPool,
    cache: Option<Arc<DiskCache>>,
    dispatcher: CallbackDispatcher,
    clients: ClientRegistry,
    coordinator: Arc<RequestCoordinator<ParkedRequest>>,
    requests: Mutex<HashMap<Option<String>, Vec<RequestHandle>>>,
    next_id: AtomicU64,
}

/// A request waiting behind an in-flight duplicate
struct ParkedRequest {
    request: Arc<Request>,
    handle: RequestHandle,
}

impl Waiter for ParkedRequest {
    fn is_cancelled(&self) -> bool {
        self.handle.is_cancelled()
    }

    fn tag(&self) -> Option<&str> {
        self.request.tag.as_deref()
    }
}

impl HttpManager {
    /// Start a manager that talks HTTP through reqwest
    ///
    /// Must be called from within a tokio runtime. The disk cache is opened
    /// in the background; requests made before it is ready skip the cache.
    ///
    /// # Errors
    ///
    /// Returns an error if any component configuration is invalid, or if the
    /// default client or the callback thread cannot be created
    pub fn new(config: ManagerConfig) -> Result<Self> {
        let factory: Arc<dyn TransportFactory> =
            Arc::new(ReqwestTransportFactory::new(config.client.clone()));
        Self::with_transport_factory(config, factory)
    }

    /// Start a manager whose clients come from `factory`
    pub fn with_transport_factory(
        config: ManagerConfig,
        factory: Arc<dyn TransportFactory>,
    ) -> Result<Self> {
        config.validate()?;

        let pool = WorkerPool::new(config.workers.clone())?;
        let clients = ClientRegistry::new(config.client.clone(), factory)?;
        let cache = config
            .cache
            .as_ref()
            .map(|c| DiskCache::new(c.clone()).map(Arc::new))
            .transpose()?;
        let dispatcher = CallbackDispatcher::start()?;

        if let Some(cache) = &cache {
            let cache = Arc::clone(cache);
            tokio::spawn(async move {
                if let Err(e) = cache.initialize().await {
                    warn!("Disk cache unavailable, requests will bypass it: {}", e);
                }
            });
        }

        info!(
            "Request manager started ({} cache)",
            if cache.is_some() { "with" } else { "without" }
        );

        Ok(Self {
            inner: Arc::new(ManagerInner {
                config,
                pool,
                cache,
                dispatcher,
                clients,
                coordinator: Arc::new(RequestCoordinator::new()),
                requests: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        })
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    pub fn cache(&self) -> Option<&Arc<DiskCache>> {
        self.inner.cache.as_ref()
    }

    /// Wait until the disk cache is open
    ///
    /// # Errors
    ///
    /// Returns the cache error if the cache directory cannot be opened
    pub async fn wait_for_cache(&self) -> Result<()> {
        if let Some(cache) = &self.inner.cache {
            cache.initialize().await?;
        }
        Ok(())
    }

    /// Schedule `request`; events go to `handler` on the callback thread
    ///
    /// Never fails: problems are reported to the handler as `Failure`
    /// followed by `Finished`. A cacheable request whose URL is already being
    /// fetched waits for that fetch and then runs against the fresh cache.
    pub fn perform_request(
        &self,
        request: Request,
        handler: Arc<dyn ResponseHandler>,
    ) -> RequestHandle {
        let inner = &self.inner;
        let request = Arc::new(request);
        let id = inner.next_id.fetch_add(1, Ordering::Relaxed);
        let sink = RequestSink::new(handler, inner.dispatcher.sender());
        let handle = RequestHandle::new(id, request.tag.clone(), request.cache_key(), sink);

        debug!(
            "Performing request {}: {} {} (priority {:?}, tag {:?})",
            id,
            request.method.as_str(),
            request.url,
            request.priority,
            request.tag
        );
        inner.track(&handle);

        // without a cache a parked duplicate could only repeat the fetch
        if !request.should_cache || inner.cache.is_none() {
            inner.launch(request, handle.clone(), None);
            return handle;
        }

        let parked = ParkedRequest {
            request,
            handle: handle.clone(),
        };
        match inner.coordinator.try_enter(handle.cache_key(), parked) {
            EnterResult::Enter(parked, claim) => {
                inner.launch(parked.request, parked.handle, Some(claim))
            }
            EnterResult::Wait => debug!("Request {} waiting on in-flight duplicate", id),
        }
        handle
    }

    /// Like [`perform_request`](Self::perform_request) with events delivered to a channel
    pub fn perform_request_with_events(
        &self,
        request: Request,
    ) -> (RequestHandle, mpsc::UnboundedReceiver<ResponseEvent>) {
        let (handler, events) = ChannelHandler::new();
        (self.perform_request(request, Arc::new(handler)), events)
    }

    /// Cancel one request; also pulls it from the pool queue if still queued
    pub fn cancel_request(&self, handle: &RequestHandle) -> bool {
        self.inner.cancel_handle(handle)
    }

    /// Cancel every request performed with `tag`, including parked duplicates
    ///
    /// Returns the number of cancel notifications sent.
    pub fn cancel_request_by_tag(&self, tag: Option<&str>) -> usize {
        let handles = self
            .inner
            .requests
            .lock()
            .remove(&tag.map(str::to_string))
            .unwrap_or_default();
        let parked = self.inner.coordinator.cancel_tag(tag);

        let mut cancelled = 0;
        for handle in &handles {
            if self.inner.cancel_handle(handle) {
                cancelled += 1;
            }
        }
        for parked in parked {
            if parked.handle.cancel() {
                cancelled += 1;
            }
        }

        info!("Cancelled {} requests with tag {:?}", cancelled, tag);
        cancelled
    }

    /// Cancel everything and forget all tracked requests
    pub fn cancel_all_requests(&self) -> usize {
        let handles: Vec<RequestHandle> = std::mem::take(&mut *self.inner.requests.lock())
            .into_values()
            .flatten()
            .collect();
        let parked = self.inner.coordinator.clear();

        let mut cancelled = 0;
        for handle in &handles {
            if self.inner.cancel_handle(handle) {
                cancelled += 1;
            }
        }
        for parked in parked {
            if parked.handle.cancel() {
                cancelled += 1;
            }
        }

        info!("Cancelled all requests ({} notified)", cancelled);
        cancelled
    }

    /// Wait until every event sent so far has reached its handler
    pub async fn flush(&self) {
        self.inner.dispatcher.flush().await
    }

    pub async fn stats(&self) -> ManagerStats {
        let cache = match &self.inner.cache {
            Some(cache) => Some(cache.stats().await),
            None => None,
        };
        let tracked_requests = self
            .inner
            .requests
            .lock()
            .values()
            .flatten()
            .filter(|h| !h.is_finished())
            .count();

        ManagerStats {
            pool: self.inner.pool.stats(),
            cache,
            in_flight_keys: self.inner.coordinator.in_flight(),
            tracked_requests,
            dedicated_clients: self.inner.clients.dedicated_count(),
        }
    }

    /// Finish queued work, deliver pending events, then close the cache
    ///
    /// Requests performed afterwards are refused.
    pub async fn shutdown(&self) {
        info!("Shutting down request manager");
        self.inner.pool.shutdown().await;
        self.inner.dispatcher.flush().await;
        if let Some(cache) = &self.inner.cache {
            cache.close().await;
        }

        let inner = Arc::clone(&self.inner);
        if let Err(e) = tokio::task::spawn_blocking(move || inner.dispatcher.stop()).await {
            error!("Failed to stop callback thread: {}", e);
        }
        info!("Request manager shut down");
    }

    /// Cancel everything and stop the pool without waiting
    pub fn shutdown_now(&self) -> usize {
        let cancelled = self.cancel_all_requests();
        self.inner.pool.shutdown_now();
        cancelled
    }
}

impl ManagerInner {
    fn track(&self, handle: &RequestHandle) {
        let mut requests = self.requests.lock();
        let group = requests
            .entry(handle.tag().map(str::to_string))
            .or_default();
        group.retain(|h| !h.is_finished());
        group.push(handle.clone());
    }

    fn cancel_handle(&self, handle: &RequestHandle) -> bool {
        let notified = handle.cancel();
        if let Some(task) = handle.task() {
            self.pool.cancel_queued(&task);
        }
        notified
    }

    /// Build an executor for `request` and hand it to the pool
    ///
    /// With a `claim` the executor carries the dedup marker for the
    /// request's cache key and resubmits the parked duplicates when done.
    fn launch(
        self: &Arc<Self>,
        request: Arc<Request>,
        handle: RequestHandle,
        claim: Option<Claim>,
    ) {
        let guard = claim.map(|claim| {
            let manager = Arc::downgrade(self);
            DedupGuard::new(
                Arc::clone(&self.coordinator),
                claim,
                move |parked: ParkedRequest| match manager.upgrade() {
                    Some(inner) => inner.launch(parked.request, parked.handle, None),
                    None => parked.handle.fail(RequestError::Shutdown),
                },
            )
        });

        let client = match self.clients.client_for(&request) {
            Ok(client) => client,
            Err(e) => {
                error!("Cannot build client for {}: {}", request.url, e);
                drop(guard);
                handle.fail(RequestError::Transport(TransportError::Internal(
                    e.to_string(),
                )));
                return;
            }
        };

        // the pool cancels its own token when it gives a task up; keep that
        // from marking the caller's handle as cancelled
        let token = handle.token().child_token();
        let mut executor = AsyncRequestExecutor::new(
            Arc::clone(&request),
            client,
            self.cache.clone(),
            handle.sink().clone(),
            token.clone(),
        );
        if let Some(guard) = guard {
            executor = executor.with_dedup(guard);
        }

        match self.pool.submit_with_token(Box::new(executor), token) {
            Ok(task) => handle.attach(task),
            Err(e) => {
                let error = match e {
                    WorkerError::PoolSaturated { .. } => RequestError::PoolSaturated,
                    _ => RequestError::Shutdown,
                };
                warn!("Request {} for {} refused: {}", handle.id(), request.url, e);
                handle.fail(error);
            }
        }
    }
}

impl fmt::Debug for HttpManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpManager")
            .field("pool", &self.inner.pool)
            .field("cache", &self.inner.cache.as_ref().map(|c| c.directory().to_path_buf()))
            .field("coordinator", &self.inner.coordinator)
            .finish()
    }
}
