//! Integration tests for the request manager public API
//!
//! Every test runs against a scripted transport and a temporary cache
//! directory; nothing touches the network.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;

use httpkit::app::{
    CacheConfig, ClientConfig, ConfigPresets, Headers, HttpManager, ManagerConfig, MockReply,
    MockTransportFactory, Request, ResponseEvent, ResponseHandler,
};
use httpkit::constants::{dispatch, http};
use httpkit::errors::{RequestError, TransportError};

fn config(dir: &TempDir) -> ManagerConfig {
    ManagerConfig::default()
        .with_cache(CacheConfig::with_cache_root(dir.path().to_path_buf()))
        .with_workers(ConfigPresets::testing())
        .with_client(ClientConfig {
            retry_sleep: Duration::ZERO,
            ..Default::default()
        })
}

async fn start(config: ManagerConfig) -> (HttpManager, Arc<MockTransportFactory>) {
    let factory = Arc::new(MockTransportFactory::default());
    let manager = HttpManager::with_transport_factory(config, factory.clone()).unwrap();
    manager.wait_for_cache().await.unwrap();
    (manager, factory)
}

async fn settle(events: &mut UnboundedReceiver<ResponseEvent>) -> Vec<ResponseEvent> {
    let mut seen = Vec::new();
    while let Ok(Some(event)) = tokio::time::timeout(Duration::from_secs(5), events.recv()).await
    {
        let terminal = matches!(event, ResponseEvent::Finished | ResponseEvent::Cancelled);
        seen.push(event);
        if terminal {
            break;
        }
    }
    seen
}

/// Records callback names and the thread each one ran on
#[derive(Default)]
struct Recorder {
    calls: Mutex<Vec<(String, String)>>,
}

impl Recorder {
    fn push(&self, name: &str) {
        let thread = std::thread::current()
            .name()
            .unwrap_or_default()
            .to_string();
        self.calls.lock().push((name.to_string(), thread));
    }

    fn names(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(n, _)| n.clone()).collect()
    }
}

impl ResponseHandler for Recorder {
    fn on_start(&self) {
        self.push("start");
    }

    fn on_success(&self, status: i32, _headers: &Headers, _body: &[u8]) {
        self.push(&format!("success {}", status));
    }

    fn on_failure(
        &self,
        status: i32,
        _headers: Option<&Headers>,
        _body: Option<&[u8]>,
        _error: &RequestError,
    ) {
        self.push(&format!("failure {}", status));
    }

    fn on_finish(&self) {
        self.push("finish");
    }

    fn on_pre_process(&self, _request: &Request) {
        self.push("pre");
    }

    fn on_post_process(&self, _request: &Request) {
        self.push("post");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_callbacks_run_serially_on_dispatch_thread() {
    let dir = TempDir::new().unwrap();
    let (manager, factory) = start(config(&dir)).await;
    factory.transport().set_default(MockReply::ok("payload"));
    factory
        .transport()
        .respond("https://example.com/missing", MockReply::status(404, "nope"));

    let ok = Arc::new(Recorder::default());
    let missing = Arc::new(Recorder::default());
    let ok_handle = manager.perform_request(
        Request::get("https://example.com/ok").with_cache(false),
        ok.clone(),
    );
    let missing_handle = manager.perform_request(
        Request::get("https://example.com/missing").with_cache(false),
        missing.clone(),
    );

    tokio::time::timeout(Duration::from_secs(5), async {
        while !(ok_handle.is_finished() && missing_handle.is_finished()) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    manager.flush().await;

    assert_eq!(
        ok.names(),
        vec!["pre", "start", "success 200", "post", "finish"]
    );
    assert_eq!(
        missing.names(),
        vec!["pre", "start", "failure 404", "post", "finish"]
    );

    // event callbacks on the dispatch thread, hooks on the worker
    for recorder in [&ok, &missing] {
        for (name, thread) in recorder.calls.lock().iter() {
            let on_dispatch = thread == dispatch::THREAD_NAME;
            assert_eq!(on_dispatch, name != "pre" && name != "post", "{}", name);
        }
    }
    manager.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_response_without_cache_headers_is_revalidated() {
    let dir = TempDir::new().unwrap();
    let (manager, factory) = start(config(&dir)).await;
    let url = "https://example.com/plain";
    factory.transport().respond(url, MockReply::ok("v1"));

    let (_first, mut events) = manager.perform_request_with_events(Request::get(url));
    settle(&mut events).await;

    factory.transport().respond(url, MockReply::ok("v2"));
    let (_second, mut events) = manager.perform_request_with_events(Request::get(url));
    let seen = settle(&mut events).await;

    assert!(seen.contains(&ResponseEvent::CacheHit { fresh: false }));
    let bodies: Vec<(i32, Vec<u8>)> = seen
        .iter()
        .filter_map(|e| match e {
            ResponseEvent::Success { status, body, .. } => Some((*status, body.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(
        bodies,
        vec![
            (http::STATUS_LOCAL_EXPIRED, b"v1".to_vec()),
            (200, b"v2".to_vec())
        ]
    );
    assert_eq!(factory.transport().calls(), 2);
    manager.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cache_timeout_override_keeps_entry_fresh() {
    let dir = TempDir::new().unwrap();
    let (manager, factory) = start(config(&dir)).await;
    let url = "https://example.com/override";
    factory
        .transport()
        .respond(url, MockReply::ok("body").with_header("Cache-Control", "no-cache"));

    let request = || Request::get(url).with_cache_timeout(Duration::from_secs(60));
    let (_first, mut events) = manager.perform_request_with_events(request());
    settle(&mut events).await;
    let (_second, mut events) = manager.perform_request_with_events(request());
    let seen = settle(&mut events).await;

    assert!(seen.contains(&ResponseEvent::CacheHit { fresh: true }));
    assert!(seen.iter().any(|e| e.is_local()));
    assert_eq!(factory.transport().calls(), 1);

    let stats = manager.stats().await;
    let cache = stats.cache.unwrap();
    assert_eq!(cache.entry_count, 1);
    assert!(cache.hits >= 1);
    manager.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_without_cache_duplicates_fetch_independently() {
    let (manager, factory) = start(ManagerConfig::default().without_cache().with_workers(
        ConfigPresets::testing(),
    ))
    .await;
    factory.transport().set_default(MockReply::ok("x"));

    let mut receivers: Vec<_> = (0..3)
        .map(|_| {
            manager
                .perform_request_with_events(Request::get("https://example.com/same"))
                .1
        })
        .collect();
    for events in receivers.iter_mut() {
        assert_eq!(settle(events).await.last(), Some(&ResponseEvent::Finished));
    }

    assert_eq!(factory.transport().calls(), 3);
    assert!(manager.stats().await.cache.is_none());
    manager.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unknown_host_fails_without_retry() {
    let dir = TempDir::new().unwrap();
    let (manager, factory) = start(config(&dir)).await;
    factory.transport().set_default(MockReply::error(TransportError::UnknownHost {
        host: "nowhere.invalid".to_string(),
    }));

    let (_handle, mut events) =
        manager.perform_request_with_events(Request::get("https://nowhere.invalid/"));
    let seen = settle(&mut events).await;

    assert!(!seen.iter().any(|e| matches!(e, ResponseEvent::Retry(_))));
    assert!(seen.iter().any(|e| matches!(
        e,
        ResponseEvent::Failure {
            status: 0,
            error: RequestError::Transport(TransportError::UnknownHost { .. }),
            ..
        }
    )));
    assert_eq!(seen.last(), Some(&ResponseEvent::Finished));
    assert_eq!(factory.transport().calls(), 1);
    manager.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_requests_after_shutdown_are_refused() {
    let dir = TempDir::new().unwrap();
    let (manager, _factory) = start(config(&dir)).await;
    manager.shutdown().await;

    let handle = manager.perform_request_with_events(Request::get("https://example.com")).0;
    assert!(handle.is_finished());
    assert!(handle.task_state().is_none());
}
