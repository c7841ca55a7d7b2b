//! Manager behaviour with a scripted transport and a temp-dir cache

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;

use super::*;
use crate::app::cache::CacheConfig;
use crate::app::client::{ClientConfig, MockReply, MockTransport, MockTransportFactory};
use crate::app::dispatch::ResponseEvent;
use crate::app::models::{Priority, Request};
use crate::app::worker::{ConfigPresets, WorkerConfig};
use crate::constants::http;
use crate::errors::RequestError;

struct Setup {
    manager: HttpManager,
    factory: Arc<MockTransportFactory>,
    _dir: TempDir,
}

impl Setup {
    async fn new(workers: WorkerConfig) -> Self {
        let dir = TempDir::new().unwrap();
        let factory = Arc::new(MockTransportFactory::default());
        let config = ManagerConfig::default()
            .with_cache(CacheConfig::with_cache_root(dir.path().to_path_buf()))
            .with_workers(workers)
            .with_client(ClientConfig {
                retry_sleep: Duration::ZERO,
                ..Default::default()
            });
        let manager = HttpManager::with_transport_factory(config, factory.clone()).unwrap();
        manager.wait_for_cache().await.unwrap();
        Self {
            manager,
            factory,
            _dir: dir,
        }
    }

    fn transport(&self) -> &Arc<MockTransport> {
        self.factory.transport()
    }
}

/// Events of one request up to and including its terminal event
async fn collect(events: &mut UnboundedReceiver<ResponseEvent>) -> Vec<ResponseEvent> {
    let mut seen = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for events")
            .expect("event channel closed");
        let terminal = matches!(event, ResponseEvent::Finished | ResponseEvent::Cancelled);
        seen.push(event);
        if terminal {
            return seen;
        }
    }
}

fn statuses(events: &[ResponseEvent]) -> Vec<i32> {
    events
        .iter()
        .filter_map(|e| match e {
            ResponseEvent::Success { status, .. } => Some(*status),
            _ => None,
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_second_request_served_from_cache() {
    let setup = Setup::new(ConfigPresets::testing()).await;
    let url = "https://example.com/cached";
    setup.transport().respond(
        url,
        MockReply::ok("body").with_header("Cache-Control", "max-age=300"),
    );

    let (_first, mut events) = setup.manager.perform_request_with_events(Request::get(url));
    assert_eq!(statuses(&collect(&mut events).await), vec![200]);

    let (_second, mut events) = setup.manager.perform_request_with_events(Request::get(url));
    assert_eq!(statuses(&collect(&mut events).await), vec![http::STATUS_LOCAL]);
    assert_eq!(setup.transport().calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_duplicates_share_one_fetch() {
    let setup = Setup::new(ConfigPresets::testing()).await;
    let url = "https://example.com/shared";
    setup.transport().set_delay(Some(Duration::from_millis(200)));
    setup.transport().respond(
        url,
        MockReply::ok("shared body").with_header("Cache-Control", "max-age=300"),
    );

    let mut receivers: Vec<_> = (0..5)
        .map(|_| setup.manager.perform_request_with_events(Request::get(url)).1)
        .collect();

    let mut network = 0;
    let mut local = 0;
    for events in receivers.iter_mut() {
        let seen = collect(events).await;
        assert_eq!(seen.last(), Some(&ResponseEvent::Finished));
        for status in statuses(&seen) {
            if status == 200 {
                network += 1;
            } else if status == http::STATUS_LOCAL {
                local += 1;
            }
        }
    }

    assert_eq!(setup.transport().calls(), 1);
    assert_eq!(network, 1);
    assert_eq!(local, 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancel_parked_duplicate_never_fetches() {
    let setup = Setup::new(ConfigPresets::testing()).await;
    let url = "https://example.com/slow";
    setup.transport().set_delay(Some(Duration::from_millis(200)));
    setup.transport().respond(url, MockReply::ok("slow"));

    let (_owner, mut owner_events) = setup.manager.perform_request_with_events(Request::get(url));
    let (parked, mut parked_events) = setup.manager.perform_request_with_events(Request::get(url));
    assert!(parked.task_state().is_none());

    assert!(setup.manager.cancel_request(&parked));
    assert!(!setup.manager.cancel_request(&parked));

    assert_eq!(collect(&mut owner_events).await.last(), Some(&ResponseEvent::Finished));
    tokio::time::sleep(Duration::from_millis(100)).await;
    setup.manager.flush().await;

    let mut seen = Vec::new();
    while let Ok(event) = parked_events.try_recv() {
        seen.push(event);
    }
    assert_eq!(seen, vec![ResponseEvent::Cancelled]);
    assert_eq!(setup.transport().calls(), 1);
    assert!(parked.is_finished());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancel_by_tag_leaves_other_tags_alone() {
    let setup = Setup::new(ConfigPresets::testing()).await;
    setup.transport().set_delay(Some(Duration::from_millis(300)));
    setup.transport().set_default(MockReply::ok("any"));

    let mut feed: Vec<_> = (0..3)
        .map(|n| {
            let request = Request::get(format!("https://example.com/feed/{n}"))
                .with_cache(false)
                .with_tag("feed");
            setup.manager.perform_request_with_events(request).1
        })
        .collect();
    let (_other, mut other_events) = setup.manager.perform_request_with_events(
        Request::get("https://example.com/avatar")
            .with_cache(false)
            .with_tag("avatar"),
    );

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(setup.manager.cancel_request_by_tag(Some("feed")), 3);

    for events in feed.iter_mut() {
        let seen = collect(events).await;
        assert_eq!(seen.last(), Some(&ResponseEvent::Cancelled));
        assert!(!seen.contains(&ResponseEvent::Finished));
    }
    assert_eq!(collect(&mut other_events).await.last(), Some(&ResponseEvent::Finished));
}

#[tokio::test]
async fn test_cancelled_owner_does_not_release_newer_duplicates() {
    let setup = Setup::new(ConfigPresets::testing()).await;
    let url = "https://example.com/regenerated";
    setup.transport().set_delay(Some(Duration::from_millis(300)));
    setup.transport().respond(
        url,
        MockReply::ok("body").with_header("Cache-Control", "max-age=300"),
    );

    let (_first, mut first) = setup.manager.perform_request_with_events(Request::get(url));
    tokio::time::sleep(Duration::from_millis(50)).await;
    setup.manager.cancel_all_requests();

    // the cancelled owner is still unwinding while the key is claimed again
    let (_second, mut second) = setup.manager.perform_request_with_events(Request::get(url));
    let (_third, mut third) = setup.manager.perform_request_with_events(Request::get(url));

    assert_eq!(collect(&mut first).await.last(), Some(&ResponseEvent::Cancelled));
    assert_eq!(statuses(&collect(&mut second).await), vec![200]);
    assert_eq!(
        statuses(&collect(&mut third).await),
        vec![http::STATUS_LOCAL]
    );
    assert_eq!(setup.transport().calls(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_saturated_pool_reports_failure_and_evicts_low_priority() {
    let workers = ConfigPresets::fixed(1).with_queue_capacity(1);
    let setup = Setup::new(workers).await;
    setup.transport().set_delay(Some(Duration::from_millis(300)));
    setup.transport().set_default(MockReply::ok("any"));

    let request = |path: &str, priority: Priority| {
        Request::get(format!("https://example.com/{path}"))
            .with_cache(false)
            .with_priority(priority)
    };

    let (_running, mut running) = setup
        .manager
        .perform_request_with_events(request("running", Priority::Normal));
    let (_queued, mut queued) = setup
        .manager
        .perform_request_with_events(request("queued", Priority::Normal));
    let (_refused, mut refused) = setup
        .manager
        .perform_request_with_events(request("refused", Priority::Low));
    let (_urgent, mut urgent) = setup
        .manager
        .perform_request_with_events(request("urgent", Priority::Immediate));

    assert_eq!(
        collect(&mut refused).await,
        vec![
            ResponseEvent::Started,
            ResponseEvent::failure(RequestError::PoolSaturated),
            ResponseEvent::Finished
        ]
    );
    assert_eq!(collect(&mut queued).await, vec![ResponseEvent::Cancelled]);
    assert_eq!(collect(&mut running).await.last(), Some(&ResponseEvent::Finished));
    assert_eq!(collect(&mut urgent).await.last(), Some(&ResponseEvent::Finished));

    let stats = setup.manager.stats().await;
    assert_eq!(stats.pool.rejected, 1);
    assert_eq!(stats.pool.evicted, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_non_default_settings_get_dedicated_client() {
    let setup = Setup::new(ConfigPresets::testing()).await;
    setup.transport().set_default(MockReply::ok("any"));

    let (_a, mut a) = setup
        .manager
        .perform_request_with_events(Request::get("https://example.com/a").with_max_retries(1));
    let (_b, mut b) = setup
        .manager
        .perform_request_with_events(Request::get("https://example.com/b").with_max_retries(1));
    collect(&mut a).await;
    collect(&mut b).await;

    // default client plus one memoised dedicated client
    assert_eq!(setup.factory.profiles().len(), 2);
    assert_eq!(setup.manager.stats().await.dedicated_clients, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancel_all_and_shutdown() {
    let setup = Setup::new(ConfigPresets::testing()).await;
    setup.transport().set_delay(Some(Duration::from_secs(30)));
    setup.transport().set_default(MockReply::ok("never"));

    let mut receivers: Vec<_> = (0..3)
        .map(|n| {
            setup
                .manager
                .perform_request_with_events(Request::get(format!("https://example.com/{n}")))
                .1
        })
        .collect();

    assert_eq!(setup.manager.cancel_all_requests(), 3);
    for events in receivers.iter_mut() {
        assert_eq!(collect(events).await.last(), Some(&ResponseEvent::Cancelled));
    }

    let stats = setup.manager.stats().await;
    assert_eq!(stats.tracked_requests, 0);

    tokio::time::timeout(Duration::from_secs(5), setup.manager.shutdown())
        .await
        .unwrap();
}
