//! Concurrency tests for the priority queue
//!
//! These tests exercise the queue from several tasks at once to check that
//! no element is lost or delivered twice.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use super::*;

#[derive(Debug)]
struct Numbered {
    id: usize,
    priority: i32,
}

impl Prioritized for Numbered {
    fn priority(&self) -> i32 {
        self.priority
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_producers_and_consumers_deliver_each_element_once() {
    let queue = Arc::new(PriorityTaskQueue::<Numbered>::new(1_000));
    let producers = 4;
    let per_producer = 200;

    let mut consumers = Vec::new();
    for _ in 0..3 {
        let queue = queue.clone();
        consumers.push(tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(item) = queue.take().await {
                seen.push(item.id);
            }
            seen
        }));
    }

    let mut handles = Vec::new();
    for p in 0..producers {
        let queue = queue.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..per_producer {
                let id = p * per_producer + i;
                let mut item = Numbered {
                    id,
                    priority: (id % 7) as i32,
                };
                loop {
                    match queue.offer(item) {
                        Ok(()) => break,
                        Err(rejected) => {
                            item = rejected.item;
                            tokio::task::yield_now().await;
                        }
                    }
                }
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    while !queue.is_empty() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    queue.close();

    let mut all = HashSet::new();
    let mut total = 0;
    for consumer in consumers {
        let seen = consumer.await.unwrap();
        total += seen.len();
        all.extend(seen);
    }

    assert_eq!(total, producers * per_producer);
    assert_eq!(all.len(), producers * per_producer);
}

#[tokio::test]
async fn test_eviction_makes_room_for_equal_priority() {
    let queue = PriorityTaskQueue::new(3);
    for id in 0..3 {
        queue.offer(Numbered { id, priority: 2 }).unwrap();
    }

    let incoming = Numbered { id: 99, priority: 2 };
    let rejected = queue.offer(incoming).unwrap_err();

    let evicted = queue.evict_for(rejected.item.priority()).unwrap();
    assert_eq!(evicted.id, 0);
    queue.offer(rejected.item).unwrap();

    let ids: Vec<_> = std::iter::from_fn(|| queue.try_take()).map(|n| n.id).collect();
    assert_eq!(ids, vec![1, 2, 99]);

    let stats = queue.stats();
    assert_eq!(stats.evicted, 1);
    assert_eq!(stats.rejected, 1);
    assert_eq!(stats.offered, 4);
}

#[tokio::test]
async fn test_drain_returns_everything_in_priority_order() {
    let queue = PriorityTaskQueue::new(10);
    queue.offer(Numbered { id: 1, priority: 1 }).unwrap();
    queue.offer(Numbered { id: 2, priority: 9 }).unwrap();
    queue.offer(Numbered { id: 3, priority: 5 }).unwrap();

    let ids: Vec<_> = queue.drain().into_iter().map(|n| n.id).collect();
    assert_eq!(ids, vec![2, 3, 1]);
    assert!(queue.is_empty());
    assert_eq!(queue.remaining_capacity(), 10);
}
