//! Worker pool behaviour tests
//!
//! Tasks here record what happened to them in a shared log so the tests can
//! check that every submission is either run or discarded exactly once.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::Notify;

use super::*;
use crate::errors::WorkerError;

type Log = Arc<Mutex<Vec<String>>>;

struct Recorded {
    name: &'static str,
    priority: i32,
    log: Log,
    gate: Option<Arc<Notify>>,
}

impl Recorded {
    fn new(name: &'static str, priority: i32, log: &Log) -> Box<Self> {
        Box::new(Self {
            name,
            priority,
            log: log.clone(),
            gate: None,
        })
    }

    fn gated(name: &'static str, priority: i32, log: &Log, gate: &Arc<Notify>) -> Box<Self> {
        Box::new(Self {
            name,
            priority,
            log: log.clone(),
            gate: Some(gate.clone()),
        })
    }
}

impl PriorityTask for Recorded {
    fn priority(&self) -> i32 {
        self.priority
    }

    fn run(self: Box<Self>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.log.lock().push(format!("run:{}", self.name));
        })
    }

    fn discard(self: Box<Self>) {
        self.log.lock().push(format!("discard:{}", self.name));
    }
}

fn single_worker(capacity: usize) -> WorkerPool {
    WorkerPool::new(ConfigPresets::single().with_queue_capacity(capacity)).unwrap()
}

async fn wait_until<F: Fn() -> bool>(condition: F) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn test_tasks_run_and_settle() {
    let pool = WorkerPool::new(ConfigPresets::testing()).unwrap();
    let log: Log = Arc::default();

    let mut handles = Vec::new();
    for name in ["a", "b", "c"] {
        handles.push(pool.submit(Recorded::new(name, 5, &log)).unwrap());
    }
    for handle in &handles {
        handle.settled().await;
        assert_eq!(handle.state(), TaskState::Done);
    }

    let mut entries = log.lock().clone();
    entries.sort();
    assert_eq!(entries, vec!["run:a", "run:b", "run:c"]);

    let stats = pool.stats();
    assert_eq!(stats.submitted, 3);
    assert_eq!(stats.completed, 3);
    assert_eq!(stats.outstanding(), 0);
}

#[tokio::test]
async fn test_queued_tasks_run_in_priority_order() {
    let pool = single_worker(8);
    let log: Log = Arc::default();
    let gate = Arc::new(Notify::new());

    let blocker = pool.submit(Recorded::gated("blocker", 5, &log, &gate)).unwrap();
    wait_until(|| blocker.state() == TaskState::Running).await;

    pool.submit(Recorded::new("low", 1, &log)).unwrap();
    pool.submit(Recorded::new("normal-1", 5, &log)).unwrap();
    pool.submit(Recorded::new("immediate", 10, &log)).unwrap();
    let last = pool.submit(Recorded::new("normal-2", 5, &log)).unwrap();

    gate.notify_one();
    last.settled().await;
    wait_until(|| log.lock().len() == 5).await;

    assert_eq!(
        *log.lock(),
        vec!["run:blocker", "run:immediate", "run:normal-1", "run:normal-2", "run:low"]
    );
}

#[tokio::test]
async fn test_saturation_evicts_lower_priority_or_rejects() {
    let pool = single_worker(2);
    let log: Log = Arc::default();
    let gate = Arc::new(Notify::new());

    let blocker = pool.submit(Recorded::gated("blocker", 5, &log, &gate)).unwrap();
    wait_until(|| blocker.state() == TaskState::Running).await;

    let first = pool.submit(Recorded::new("queued-1", 5, &log)).unwrap();
    pool.submit(Recorded::new("queued-2", 5, &log)).unwrap();

    // Lower than everything queued: nothing may be evicted for it.
    let err = pool.submit(Recorded::new("too-low", 1, &log)).unwrap_err();
    assert!(matches!(err, WorkerError::PoolSaturated { .. }));

    // Equal priority evicts the earliest queued task.
    pool.submit(Recorded::new("newcomer", 5, &log)).unwrap();
    assert_eq!(first.state(), TaskState::Cancelled);
    assert!(log.lock().contains(&"discard:queued-1".to_string()));

    gate.notify_one();
    wait_until(|| log.lock().len() == 4).await;

    let entries = log.lock().clone();
    assert!(!entries.iter().any(|e| e.ends_with("too-low")));
    assert!(entries.contains(&"run:queued-2".to_string()));
    assert!(entries.contains(&"run:newcomer".to_string()));

    let stats = pool.stats();
    assert_eq!(stats.rejected, 1);
    assert_eq!(stats.evicted, 1);
}

#[tokio::test]
async fn test_cancelled_queued_task_is_discarded_not_run() {
    let pool = single_worker(4);
    let log: Log = Arc::default();
    let gate = Arc::new(Notify::new());

    let blocker = pool.submit(Recorded::gated("blocker", 5, &log, &gate)).unwrap();
    wait_until(|| blocker.state() == TaskState::Running).await;

    let victim = pool.submit(Recorded::new("victim", 5, &log)).unwrap();
    let lazy = pool.submit(Recorded::new("lazy", 5, &log)).unwrap();
    let survivor = pool.submit(Recorded::new("survivor", 5, &log)).unwrap();

    assert!(victim.cancel());
    assert!(pool.cancel_queued(&victim));

    // Cancelled without removal: the worker discards it when reached.
    assert!(lazy.cancel());

    gate.notify_one();
    survivor.settled().await;
    lazy.settled().await;

    let entries = log.lock().clone();
    assert_eq!(
        entries,
        vec!["discard:victim", "run:blocker", "discard:lazy", "run:survivor"]
    );
    assert_eq!(pool.stats().cancelled, 2);
}

#[tokio::test]
async fn test_shutdown_now_discards_queue_and_cancels_running() {
    let pool = single_worker(4);
    let log: Log = Arc::default();
    let gate = Arc::new(Notify::new());

    let running = pool.submit(Recorded::gated("running", 5, &log, &gate)).unwrap();
    wait_until(|| running.state() == TaskState::Running).await;
    pool.submit(Recorded::new("queued-a", 3, &log)).unwrap();
    pool.submit(Recorded::new("queued-b", 7, &log)).unwrap();

    assert_eq!(pool.shutdown_now(), 2);
    assert!(running.token().is_cancelled());
    assert_eq!(pool.state(), PoolState::Shutdown);
    assert!(matches!(
        pool.spawn(async {}),
        Err(WorkerError::Shutdown)
    ));

    let entries = log.lock().clone();
    assert_eq!(entries, vec!["discard:queued-b", "discard:queued-a"]);
    gate.notify_one();
}

#[tokio::test]
async fn test_graceful_shutdown_runs_queued_work() {
    let pool = single_worker(8);
    let log: Log = Arc::default();

    for name in ["one", "two", "three"] {
        pool.submit(Recorded::new(name, 5, &log)).unwrap();
    }
    pool.shutdown().await;

    assert_eq!(log.lock().len(), 3);
    assert_eq!(pool.state(), PoolState::Shutdown);
    assert_eq!(pool.stats().live_workers, 0);
}

#[tokio::test]
async fn test_core_workers_time_out_when_allowed() {
    let config = ConfigPresets::testing()
        .with_keep_alive(Duration::from_millis(20))
        .with_allow_core_timeout(true);
    let pool = WorkerPool::new(config).unwrap();

    let a = pool.spawn(async {}).unwrap();
    let b = pool.spawn(async {}).unwrap();
    a.settled().await;
    b.settled().await;
    assert!(pool.stats().workers_started >= 1);

    wait_until(|| pool.stats().live_workers == 0).await;
}

#[tokio::test]
async fn test_core_workers_stay_without_core_timeout() {
    let pool = WorkerPool::new(ConfigPresets::testing()).unwrap();
    assert_eq!(pool.prestart_core_workers(), 2);

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(pool.stats().live_workers, 2);
}

#[tokio::test]
async fn test_panicking_task_does_not_kill_pool() {
    let pool = single_worker(4);
    let bad = pool.spawn(async { panic!("boom") }).unwrap();
    bad.settled().await;

    let ok = pool.spawn(async {}).unwrap();
    ok.settled().await;

    let stats = pool.stats();
    assert_eq!(stats.panicked, 1);
    assert_eq!(stats.completed, 2);
}
