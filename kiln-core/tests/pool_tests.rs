use kiln_core::WorkerPool;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_never_exceeds_pool_size() {
    let pool = Arc::new(WorkerPool::new(3));
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for _ in 0..24 {
        let pool = pool.clone();
        let active = active.clone();
        let peak = peak.clone();
        tasks.push(tokio::spawn(async move {
            let _lease = pool.lease().await.unwrap();
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            active.fetch_sub(1, Ordering::SeqCst);
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert!(peak.load(Ordering::SeqCst) <= 3);
    assert_eq!(pool.available(), 3);
}

#[tokio::test]
async fn test_lease_returns_after_panic() {
    let pool = Arc::new(WorkerPool::new(1));

    let held = pool.clone();
    let result = tokio::spawn(async move {
        let _lease = held.lease().await.unwrap();
        panic!("cycle blew up");
    })
    .await;
    assert!(result.unwrap_err().is_panic());

    let lease = tokio::time::timeout(Duration::from_secs(1), pool.lease())
        .await
        .expect("worker was not returned")
        .unwrap();
    assert_eq!(lease.cycles(), 1);
}

#[tokio::test]
async fn test_waiters_are_served_in_turn() {
    let pool = Arc::new(WorkerPool::new(1));
    let first = pool.lease().await.unwrap();

    let waiting = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.lease().await.map(|lease| lease.id()) })
    };
    tokio::task::yield_now().await;
    assert!(!waiting.is_finished());

    let id = first.id();
    drop(first);
    assert_eq!(waiting.await.unwrap().unwrap(), id);
}
