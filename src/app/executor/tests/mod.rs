//! Executor state machine against a scripted transport
//!
//! Events are collected through a [`ChannelHandler`] behind a real
//! dispatcher thread, so the orderings asserted here are the ones callers see.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::app::cache::{now_millis, CacheConfig, CacheEntry, DiskCache};
use crate::app::client::{HttpClient, MockReply, MockTransport, RetryHandler};
use crate::app::dispatch::{
    CallbackDispatcher, ChannelHandler, RequestSink, ResponseEvent, ResponseHandler,
};
use crate::app::models::{Headers, Request};
use crate::constants::http;
use crate::errors::{RequestError, TransportError};

const URL: &str = "https://example.com/feed";

struct Harness {
    dispatcher: CallbackDispatcher,
    transport: Arc<MockTransport>,
    cache: Arc<DiskCache>,
    _dir: TempDir,
}

impl Harness {
    async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::new(CacheConfig::with_cache_root(dir.path().to_path_buf())).unwrap();
        cache.initialize().await.unwrap();
        Self {
            dispatcher: CallbackDispatcher::start().unwrap(),
            transport: Arc::new(MockTransport::new()),
            cache: Arc::new(cache),
            _dir: dir,
        }
    }

    fn executor_with(
        &self,
        request: Request,
        handler: Arc<dyn ResponseHandler>,
    ) -> (AsyncRequestExecutor, CancellationToken) {
        let retry = RetryHandler::new(request.max_retries, Duration::ZERO);
        let client = HttpClient::new(self.transport.clone(), retry);
        let sink = RequestSink::new(handler, self.dispatcher.sender());
        let token = CancellationToken::new();
        let executor = AsyncRequestExecutor::new(
            Arc::new(request),
            client,
            Some(self.cache.clone()),
            sink,
            token.clone(),
        );
        (executor, token)
    }

    fn executor(
        &self,
        request: Request,
    ) -> (
        AsyncRequestExecutor,
        CancellationToken,
        UnboundedReceiver<ResponseEvent>,
    ) {
        let (handler, events) = ChannelHandler::new();
        let (executor, token) = self.executor_with(request, Arc::new(handler));
        (executor, token, events)
    }

    async fn drain(&self, events: &mut UnboundedReceiver<ResponseEvent>) -> Vec<ResponseEvent> {
        self.dispatcher.flush().await;
        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        seen
    }

    async fn seed(&self, body: &[u8], ttl: i64, etag: Option<&str>) {
        let entry = CacheEntry {
            data: body.to_vec(),
            etag: etag.map(str::to_string),
            server_date: 0,
            ttl,
            soft_ttl: ttl,
            headers: [("Content-Type", "text/plain")].into_iter().collect(),
        };
        self.cache
            .put(&Request::get(URL).cache_key(), &entry)
            .await
            .unwrap();
    }
}

fn success(status: i32, body: &[u8]) -> impl Fn(&ResponseEvent) -> bool + '_ {
    move |event| {
        matches!(event, ResponseEvent::Success { status: s, body: b, .. } if *s == status && b == body)
    }
}

#[tokio::test]
async fn test_cache_miss_fetches_and_stores() {
    let harness = Harness::new().await;
    harness.transport.respond(
        URL,
        MockReply::ok("fresh body").with_header("Cache-Control", "max-age=60"),
    );

    let (executor, _token, mut events) = harness.executor(Request::get(URL));
    assert_eq!(executor.execute().await, ExecState::Finished);

    let seen = harness.drain(&mut events).await;
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[0], ResponseEvent::Started);
    assert!(success(200, b"fresh body")(&seen[1]));
    assert_eq!(seen[2], ResponseEvent::Finished);

    let stored = harness.cache.get(&Request::get(URL).cache_key()).await.unwrap();
    assert_eq!(stored.data, b"fresh body");
    assert!(!stored.is_expired());
}

#[tokio::test]
async fn test_fresh_hit_skips_network() {
    let harness = Harness::new().await;
    harness.seed(b"cached", now_millis() + 60_000, None).await;

    let (executor, _token, mut events) = harness.executor(Request::get(URL));
    assert_eq!(executor.execute().await, ExecState::Finished);

    let seen = harness.drain(&mut events).await;
    assert_eq!(seen[0], ResponseEvent::Started);
    assert_eq!(seen[1], ResponseEvent::CacheHit { fresh: true });
    assert!(success(http::STATUS_LOCAL, b"cached")(&seen[2]));
    assert_eq!(seen[3], ResponseEvent::Finished);
    assert_eq!(seen.len(), 4);
    assert_eq!(harness.transport.calls(), 0);
}

#[tokio::test]
async fn test_stale_hit_serves_cache_then_network() {
    let harness = Harness::new().await;
    harness.seed(b"old", now_millis() - 1_000, None).await;
    harness.transport.respond(URL, MockReply::ok("new"));

    let (executor, _token, mut events) = harness.executor(Request::get(URL));
    executor.execute().await;

    let seen = harness.drain(&mut events).await;
    let successes: Vec<_> = seen
        .iter()
        .filter(|e| matches!(e, ResponseEvent::Success { .. }))
        .collect();
    assert_eq!(successes.len(), 2);
    assert!(success(http::STATUS_LOCAL_EXPIRED, b"old")(successes[0]));
    assert!(success(200, b"new")(successes[1]));
    assert!(seen.contains(&ResponseEvent::CacheHit { fresh: false }));
    assert_eq!(seen.last(), Some(&ResponseEvent::Finished));
    assert_eq!(harness.transport.calls(), 1);
}

#[tokio::test]
async fn test_not_modified_serves_cached_body_and_refreshes() {
    let harness = Harness::new().await;
    harness.seed(b"still good", now_millis() - 1_000, Some("\"v1\"")).await;
    harness.transport.respond(
        URL,
        MockReply::status(304, Vec::new()).with_header("Cache-Control", "max-age=120"),
    );

    let (executor, _token, mut events) = harness.executor(Request::get(URL));
    executor.execute().await;

    let sent = harness.transport.requests();
    assert_eq!(sent[0].headers.get("If-None-Match"), Some("\"v1\""));

    let seen = harness.drain(&mut events).await;
    let last_success = seen
        .iter()
        .rev()
        .find(|e| matches!(e, ResponseEvent::Success { .. }))
        .unwrap();
    match last_success {
        ResponseEvent::Success {
            status,
            headers,
            body,
        } => {
            assert_eq!(*status, 304);
            assert_eq!(body, b"still good");
            assert_eq!(headers.get("Content-Type"), Some("text/plain"));
            assert_eq!(headers.get("Cache-Control"), Some("max-age=120"));
        }
        _ => unreachable!(),
    }

    let refreshed = harness.cache.get(&Request::get(URL).cache_key()).await.unwrap();
    assert!(!refreshed.is_expired());
    assert_eq!(refreshed.data, b"still good");
}

#[tokio::test]
async fn test_io_errors_retried_up_to_max() {
    let harness = Harness::new().await;
    harness.transport.respond(
        URL,
        MockReply::error(TransportError::Io("connection reset".to_string())),
    );

    let (executor, _token, mut events) = harness.executor(Request::get(URL).with_max_retries(3));
    assert_eq!(executor.execute().await, ExecState::Finished);

    let seen = harness.drain(&mut events).await;
    let retries: Vec<u32> = seen
        .iter()
        .filter_map(|e| match e {
            ResponseEvent::Retry(n) => Some(*n),
            _ => None,
        })
        .collect();
    assert_eq!(retries, vec![1, 2, 3]);

    let failures: Vec<_> = seen
        .iter()
        .filter(|e| matches!(e, ResponseEvent::Failure { .. }))
        .collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(
        *failures[0],
        ResponseEvent::failure(RequestError::Transport(TransportError::Io(
            "connection reset".to_string()
        )))
    );
    assert_eq!(seen.last(), Some(&ResponseEvent::Finished));
    assert_eq!(harness.transport.calls(), 4);
}

#[tokio::test]
async fn test_unknown_host_on_first_attempt_not_retried() {
    let harness = Harness::new().await;
    harness.transport.respond(
        URL,
        MockReply::error(TransportError::UnknownHost {
            host: "example.com".to_string(),
        }),
    );

    let (executor, _token, mut events) = harness.executor(Request::get(URL));
    executor.execute().await;

    let seen = harness.drain(&mut events).await;
    assert!(!seen.iter().any(|e| matches!(e, ResponseEvent::Retry(_))));
    assert_eq!(harness.transport.calls(), 1);
}

#[tokio::test]
async fn test_unknown_host_after_earlier_failure_is_retried() {
    let harness = Harness::new().await;
    harness.transport.respond(
        URL,
        MockReply::error(TransportError::Io("reset".to_string())),
    );
    harness.transport.respond(
        URL,
        MockReply::error(TransportError::UnknownHost {
            host: "example.com".to_string(),
        }),
    );
    harness.transport.respond(URL, MockReply::ok("back"));

    let (executor, _token, mut events) = harness.executor(Request::get(URL));
    executor.execute().await;

    let seen = harness.drain(&mut events).await;
    assert!(seen.contains(&ResponseEvent::Retry(1)));
    assert!(seen.contains(&ResponseEvent::Retry(2)));
    assert!(seen.iter().any(success(200, b"back")));
    assert_eq!(harness.transport.calls(), 3);
}

#[tokio::test]
async fn test_malformed_url_fails_without_network() {
    let harness = Harness::new().await;
    let (executor, _token, mut events) = harness.executor(Request::get("ftp://example.com/file"));
    executor.execute().await;

    let seen = harness.drain(&mut events).await;
    assert!(matches!(
        &seen[1],
        ResponseEvent::Failure {
            error: RequestError::Transport(TransportError::MalformedUrl { .. }),
            ..
        }
    ));
    assert_eq!(harness.transport.calls(), 0);
}

#[tokio::test]
async fn test_http_error_status_is_failure_and_not_cached() {
    let harness = Harness::new().await;
    harness
        .transport
        .respond(URL, MockReply::status(500, "boom"));

    let (executor, _token, mut events) = harness.executor(Request::get(URL));
    executor.execute().await;

    let seen = harness.drain(&mut events).await;
    assert_eq!(
        seen[1],
        ResponseEvent::Failure {
            status: 500,
            headers: Some(Headers::new()),
            body: Some(b"boom".to_vec()),
            error: RequestError::HttpStatus { status: 500 },
        }
    );
    assert!(harness
        .cache
        .get(&Request::get(URL).cache_key())
        .await
        .is_none());
}

#[tokio::test]
async fn test_no_cache_request_bypasses_cache() {
    let harness = Harness::new().await;
    harness.seed(b"cached", now_millis() + 60_000, None).await;
    harness.transport.respond(URL, MockReply::ok("live"));

    let (executor, _token, mut events) = harness.executor(Request::get(URL).with_cache(false));
    executor.execute().await;

    let seen = harness.drain(&mut events).await;
    assert!(!seen.iter().any(|e| e.is_local()));
    assert_eq!(harness.transport.calls(), 1);
}

#[tokio::test]
async fn test_cancelled_before_start_sends_only_cancel() {
    let harness = Harness::new().await;
    let (executor, token, mut events) = harness.executor(Request::get(URL));
    token.cancel();

    assert_eq!(executor.execute().await, ExecState::Cancelled);
    assert_eq!(harness.drain(&mut events).await, vec![ResponseEvent::Cancelled]);
    assert_eq!(harness.transport.calls(), 0);
}

#[tokio::test]
async fn test_cancel_aborts_in_flight_attempt() {
    let harness = Harness::new().await;
    harness.transport.set_delay(Some(Duration::from_secs(30)));
    harness.transport.respond(URL, MockReply::ok("late"));

    let (executor, token, mut events) = harness.executor(Request::get(URL).with_cache(false));
    let running = tokio::spawn(executor.execute());
    tokio::time::sleep(Duration::from_millis(50)).await;
    token.cancel();

    let state = tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state, ExecState::Cancelled);
    assert_eq!(
        harness.drain(&mut events).await,
        vec![ResponseEvent::Started, ResponseEvent::Cancelled]
    );
}

struct Duplicate(Arc<Mutex<Vec<&'static str>>>);

impl crate::app::coordinator::Waiter for Duplicate {
    fn is_cancelled(&self) -> bool {
        false
    }

    fn tag(&self) -> Option<&str> {
        None
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_executor_holding_dedup_guard_runs_on_spawned_task() {
    use crate::app::coordinator::{DedupGuard, EnterResult, RequestCoordinator};

    let harness = Harness::new().await;
    harness.transport.respond(
        URL,
        MockReply::ok("body").with_header("Cache-Control", "max-age=60"),
    );

    let coordinator = Arc::new(RequestCoordinator::new());
    let released = Arc::new(Mutex::new(Vec::new()));
    let key = Request::get(URL).cache_key();
    let EnterResult::Enter(_, claim) =
        coordinator.try_enter(&key, Duplicate(Arc::clone(&released)))
    else {
        panic!("key already in flight");
    };
    coordinator.try_enter(&key, Duplicate(Arc::clone(&released)));

    let (executor, _token, mut events) = harness.executor(Request::get(URL));
    let guard = DedupGuard::new(Arc::clone(&coordinator), claim, |waiter: Duplicate| {
        waiter.0.lock().push("resubmitted")
    });
    let task: Box<dyn crate::app::worker::PriorityTask> = Box::new(executor.with_dedup(guard));

    tokio::spawn(task.run()).await.unwrap();

    assert_eq!(harness.drain(&mut events).await.last(), Some(&ResponseEvent::Finished));
    assert_eq!(*released.lock(), vec!["resubmitted"]);
    assert!(!coordinator.is_in_flight(&key));
    assert!(harness.cache.get(&key).await.is_some());
}

#[derive(Default)]
struct HookLog {
    entries: Mutex<Vec<String>>,
}

impl ResponseHandler for HookLog {
    fn on_event(&self, event: &ResponseEvent) {
        self.entries.lock().push(event.kind().to_string());
    }

    fn on_pre_process(&self, _request: &Request) {
        self.entries.lock().push("pre".to_string());
    }

    fn on_post_process(&self, _request: &Request) {
        self.entries.lock().push("post".to_string());
    }
}

#[tokio::test]
async fn test_hooks_run_once_around_events() {
    let harness = Harness::new().await;
    harness.transport.respond(URL, MockReply::ok("body"));

    let log = Arc::new(HookLog::default());
    let (executor, _token) = harness.executor_with(Request::get(URL), log.clone());
    executor.execute().await;
    harness.dispatcher.flush().await;

    let entries = log.entries.lock().clone();
    let position = |name: &str| entries.iter().position(|e| e == name).unwrap();
    assert_eq!(entries.iter().filter(|e| *e == "pre").count(), 1);
    assert_eq!(entries.iter().filter(|e| *e == "post").count(), 1);
    assert!(position("pre") < position("start"));
    assert!(position("post") < position("finish"));
}

#[tokio::test]
async fn test_discard_sends_single_cancel() {
    let harness = Harness::new().await;
    let (executor, _token, mut events) = harness.executor(Request::get(URL));

    let task: Box<dyn crate::app::worker::PriorityTask> = Box::new(executor);
    task.discard();

    assert_eq!(harness.drain(&mut events).await, vec![ResponseEvent::Cancelled]);
}
