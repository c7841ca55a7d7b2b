//! The per-request state machine

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::app::cache::{apply_cache_timeout, now_millis, parse_cache_headers, CacheEntry, DiskCache};
use crate::app::client::{validate_url, HttpClient, TransportRequest, TransportResponse};
use crate::app::coordinator::DedupGuard;
use crate::app::dispatch::{RequestSink, ResponseEvent};
use crate::app::hash::CacheKey;
use crate::app::models::Request;
use crate::app::worker::PriorityTask;
use crate::constants::http;
use crate::errors::{RequestError, TransportError, TransportResult};

use super::state::ExecState;

/// Cancellation was observed; the caller has already been notified
#[derive(Debug)]
struct Interrupted;

type Step<T = ()> = Result<T, Interrupted>;

/// Runs one request from cache check to final notification
///
/// The cancellation token is checked before every state transition and
/// raced against every network attempt and retry pause. Once cancellation
/// is observed a single `Cancelled` event is sent and nothing else follows.
pub struct AsyncRequestExecutor {
    request: Arc<Request>,
    key: CacheKey,
    client: HttpClient,
    cache: Option<Arc<DiskCache>>,
    sink: RequestSink,
    token: CancellationToken,
    state: ExecState,
    execution_count: u32,
    pre_processed: bool,
    post_processed: bool,
    dedup: Option<DedupGuard>,
}

impl AsyncRequestExecutor {
    pub fn new(
        request: Arc<Request>,
        client: HttpClient,
        cache: Option<Arc<DiskCache>>,
        sink: RequestSink,
        token: CancellationToken,
    ) -> Self {
        let key = request.cache_key();
        Self {
            request,
            key,
            client,
            cache,
            sink,
            token,
            state: ExecState::Created,
            execution_count: 0,
            pre_processed: false,
            post_processed: false,
            dedup: None,
        }
    }

    /// Hold the dedup marker for this request's key until the executor is done
    pub fn with_dedup(mut self, guard: DedupGuard) -> Self {
        self.dedup = Some(guard);
        self
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn state(&self) -> ExecState {
        self.state
    }

    /// Drive the request to completion, returning the final state
    pub async fn execute(mut self) -> ExecState {
        debug!("Executing {} {}", self.request.method.as_str(), self.request.url);
        if self.drive().await.is_err() {
            debug!("Request for {} cancelled in state {}", self.request.url, self.state);
            self.state = ExecState::Cancelled;
        }
        // parked duplicates go only after the cache has been written
        if let Some(guard) = self.dedup.take() {
            guard.release();
        }
        self.state
    }

    async fn drive(&mut self) -> Step {
        self.advance(ExecState::PreProcessing)?;
        self.pre_process();
        self.sink.send(ResponseEvent::Started);

        let stale = match self.check_cache().await? {
            CacheOutcome::Fresh => return self.complete(),
            CacheOutcome::Stale(entry) => Some(entry),
            CacheOutcome::Miss => None,
        };

        match self.fetch(stale.as_ref()).await? {
            Ok(response) => self.deliver(response, stale).await?,
            Err(error) => {
                self.advance(ExecState::Failure)?;
                warn!("Request for {} failed: {}", self.request.url, error);
                self.sink
                    .send(ResponseEvent::failure(RequestError::Transport(error)));
            }
        }
        self.complete()
    }

    /// Cache lookup; delivers the cached body when there is one
    async fn check_cache(&mut self) -> Step<CacheOutcome> {
        let Some(cache) = self.ready_cache() else {
            return Ok(CacheOutcome::Miss);
        };
        self.advance(ExecState::CacheCheck)?;

        let Some(entry) = cache.get(&self.key).await else {
            self.advance(ExecState::CacheMiss)?;
            trace!("Cache miss for {}", self.request.url);
            return Ok(CacheOutcome::Miss);
        };

        let fresh = !entry.is_expired();
        self.advance(if fresh {
            ExecState::CacheHitFresh
        } else {
            ExecState::CacheHitStale
        })?;
        debug!(
            "Cache hit for {} ({})",
            self.request.url,
            if fresh { "fresh" } else { "stale" }
        );

        self.sink.send(ResponseEvent::CacheHit { fresh });
        self.sink.send(ResponseEvent::Success {
            status: if fresh {
                http::STATUS_LOCAL
            } else {
                http::STATUS_LOCAL_EXPIRED
            },
            headers: entry.headers.clone(),
            body: entry.data.clone(),
        });

        Ok(if fresh {
            CacheOutcome::Fresh
        } else {
            CacheOutcome::Stale(entry)
        })
    }

    /// Network attempts with retries
    ///
    /// The outer `Step` reports cancellation; the inner result is the final
    /// outcome once the retry policy has given up.
    async fn fetch(
        &mut self,
        stale: Option<&CacheEntry>,
    ) -> Step<TransportResult<TransportResponse>> {
        let mut wire = TransportRequest::from_request(&self.request);
        if let Some(entry) = stale {
            wire = wire.with_extra_headers(&entry.conditional_headers());
        }
        let retry = self.client.retry_handler().clone();
        let transport = Arc::clone(self.client.transport());
        let token = self.token.clone();

        loop {
            self.advance(ExecState::NetworkAttempt)?;
            let attempt = async {
                validate_url(&wire.url)?;
                transport.execute(&wire).await
            };
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => return Err(self.interrupt()),
                result = attempt => result,
            };

            let error = match result {
                Ok(response) => return Ok(Ok(response)),
                Err(error) => error,
            };

            // a host that fails to resolve on the first try is assumed bad
            let retrying = if matches!(error, TransportError::UnknownHost { .. })
                && self.execution_count == 0
            {
                false
            } else {
                self.execution_count += 1;
                retry.retry_request(&error, self.execution_count)
            };

            if !retrying {
                return Ok(Err(error));
            }

            self.advance(ExecState::Retry)?;
            info!(
                "Retrying {} after {} (attempt {} of {})",
                self.request.url,
                error,
                self.execution_count,
                retry.max_retries()
            );
            self.sink.send(ResponseEvent::Retry(self.execution_count));

            let pause = retry.delay();
            tokio::select! {
                biased;
                _ = token.cancelled() => return Err(self.interrupt()),
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }

    /// Hand a response to the caller and persist it
    async fn deliver(&mut self, response: TransportResponse, stale: Option<CacheEntry>) -> Step {
        if response.is_not_modified() {
            if let Some(entry) = stale {
                self.advance(ExecState::Success)?;
                debug!("{} not modified, serving cached body", self.request.url);
                let headers = entry.headers.merged_with(&response.headers);
                self.sink.send(ResponseEvent::Success {
                    status: i32::from(response.status),
                    headers: headers.clone(),
                    body: entry.data.clone(),
                });

                let mut refreshed = parse_cache_headers(&headers, now_millis());
                refreshed.data = entry.data;
                self.store(refreshed).await;
                return Ok(());
            }
        }

        if !response.is_success() {
            self.advance(ExecState::Failure)?;
            warn!(
                "Request for {} returned HTTP {}",
                self.request.url, response.status
            );
            self.sink.send(ResponseEvent::Failure {
                status: i32::from(response.status),
                headers: Some(response.headers),
                body: Some(response.body),
                error: RequestError::HttpStatus {
                    status: response.status,
                },
            });
            return Ok(());
        }

        self.advance(ExecState::Success)?;
        debug!(
            "Request for {} succeeded with HTTP {} ({} bytes)",
            self.request.url,
            response.status,
            response.body.len()
        );
        let entry = self
            .ready_cache()
            .map(|_| parse_cache_headers(&response.headers, now_millis()));
        let TransportResponse {
            status,
            headers,
            body,
        } = response;
        let data = entry.as_ref().map(|_| body.clone());
        self.sink.send(ResponseEvent::Success {
            status: i32::from(status),
            headers,
            body,
        });

        if let (Some(mut entry), Some(data)) = (entry, data) {
            entry.data = data;
            self.store(entry).await;
        }
        Ok(())
    }

    async fn store(&self, mut entry: CacheEntry) {
        let Some(cache) = self.ready_cache() else {
            return;
        };
        if let Some(timeout) = self.request.cache_timeout {
            apply_cache_timeout(&mut entry, timeout, now_millis());
        }
        if let Err(e) = cache.put(&self.key, &entry).await {
            warn!("Failed to cache response for {}: {}", self.request.url, e);
        }
    }

    fn complete(&mut self) -> Step {
        self.advance(ExecState::PostProcessing)?;
        self.post_process();
        self.advance(ExecState::Finished)?;
        self.sink.send(ResponseEvent::Finished);
        debug!("Request for {} finished", self.request.url);
        Ok(())
    }

    /// Cache to use for this request, if caching applies and the cache is up
    fn ready_cache(&self) -> Option<Arc<DiskCache>> {
        if !self.request.should_cache {
            return None;
        }
        self.cache.as_ref().filter(|c| c.is_ready()).cloned()
    }

    fn advance(&mut self, next: ExecState) -> Step {
        if self.token.is_cancelled() {
            return Err(self.interrupt());
        }
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        trace!("{}: {} -> {}", self.request.url, self.state, next);
        self.state = next;
        Ok(())
    }

    fn interrupt(&mut self) -> Interrupted {
        self.sink.send_cancel();
        self.state = ExecState::Cancelled;
        Interrupted
    }

    fn pre_process(&mut self) {
        if !self.pre_processed {
            self.pre_processed = true;
            self.sink.handler().on_pre_process(&self.request);
        }
    }

    fn post_process(&mut self) {
        if !self.post_processed {
            self.post_processed = true;
            self.sink.handler().on_post_process(&self.request);
        }
    }
}

enum CacheOutcome {
    Fresh,
    Stale(CacheEntry),
    Miss,
}

impl PriorityTask for AsyncRequestExecutor {
    fn priority(&self) -> i32 {
        self.request.priority.value()
    }

    fn run(self: Box<Self>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            self.execute().await;
        })
    }

    fn discard(self: Box<Self>) {
        debug!("Request for {} discarded before running", self.request.url);
        self.sink.send_cancel();
    }
}

impl fmt::Debug for AsyncRequestExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncRequestExecutor")
            .field("url", &self.request.url)
            .field("key", &self.key)
            .field("state", &self.state)
            .field("execution_count", &self.execution_count)
            .finish()
    }
}
