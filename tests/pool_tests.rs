use std::sync::Arc;
use std::time::Duration;

use gridbatch::pool::{Capacity, ExecutorPool, ExecutorStatus};
use gridbatch::sched::TaskType;
use uuid::Uuid;

fn capacity(max_tasks: usize, power: u8) -> Capacity {
    Capacity::new(4, 8192, 100, power).with_max_concurrent_tasks(max_tasks)
}

fn pool() -> ExecutorPool {
    ExecutorPool::new(Duration::from_secs(30), Duration::from_secs(60))
}

#[tokio::test]
async fn duplicate_registration_is_rejected_without_side_effects() {
    let pool = pool();
    assert!(pool.register("e1", "10.0.0.1:7070", capacity(2, 50)).await);
    let before = pool.get("e1").await.unwrap();

    assert!(!pool.register("e1", "10.0.0.9:9999", capacity(8, 99)).await);

    let after = pool.get("e1").await.unwrap();
    assert_eq!(pool.len().await, 1);
    assert_eq!(after.address, before.address);
    assert_eq!(after.capacity.max_concurrent_tasks, 2);
    assert_eq!(after.capacity.compute_power, 50);
    assert_eq!(pool.stats().await.total_registered, 1);
}

#[tokio::test]
async fn registered_executor_starts_ready_with_zero_load() {
    let pool = pool();
    pool.register("e1", "10.0.0.1:7070", capacity(2, 50)).await;
    let record = pool.get("e1").await.unwrap();
    assert_eq!(record.status, ExecutorStatus::Ready);
    assert_eq!(record.load, 0);
}

#[tokio::test]
async fn load_never_exceeds_capacity_under_concurrent_assigns() {
    let pool = Arc::new(pool());
    pool.register("e1", "10.0.0.1:7070", capacity(2, 50)).await;

    let mut handles = Vec::new();
    for _ in 0..10 {
        let pool = pool.clone();
        handles.push(tokio::spawn(
            async move { pool.assign("e1", Uuid::new_v4()).await },
        ));
    }

    let mut successes = 0;
    for handle in handles {
        if handle.await.unwrap() {
            successes += 1;
        }
    }

    assert_eq!(successes, 2);
    let record = pool.get("e1").await.unwrap();
    assert_eq!(record.load, 2);
    assert_eq!(record.status, ExecutorStatus::Busy);
}

#[tokio::test]
async fn assign_and_release_round_trip() {
    let pool = pool();
    pool.register("e1", "10.0.0.1:7070", capacity(1, 50)).await;

    let task = Uuid::new_v4();
    assert!(pool.assign("e1", task).await);
    assert_eq!(pool.get("e1").await.unwrap().status, ExecutorStatus::Busy);
    assert_eq!(pool.holder_of(&task).await.as_deref(), Some("e1"));

    assert!(pool.release("e1", &task, 1500, true).await);
    let record = pool.get("e1").await.unwrap();
    assert_eq!(record.status, ExecutorStatus::Ready);
    assert_eq!(record.load, 0);
    assert_eq!(record.completed_tasks, 1);
    assert_eq!(record.total_execution_ms, 1500);
    assert!(pool.holder_of(&task).await.is_none());
}

#[tokio::test]
async fn release_of_task_not_held_fails() {
    let pool = pool();
    pool.register("e1", "10.0.0.1:7070", capacity(1, 50)).await;
    assert!(!pool.release("e1", &Uuid::new_v4(), 100, true).await);
    assert!(!pool.release("ghost", &Uuid::new_v4(), 100, true).await);
}

#[tokio::test]
async fn failure_release_updates_failure_counter() {
    let pool = pool();
    pool.register("e1", "10.0.0.1:7070", capacity(1, 50)).await;
    let task = Uuid::new_v4();
    pool.assign("e1", task).await;
    pool.release("e1", &task, 0, false).await;
    let record = pool.get("e1").await.unwrap();
    assert_eq!(record.failed_tasks, 1);
    assert_eq!(record.completed_tasks, 0);
}

#[tokio::test]
async fn selection_prefers_spare_capacity_and_power() {
    let pool = pool();
    pool.register("loaded", "10.0.0.1:7070", capacity(2, 80)).await;
    pool.register("idle", "10.0.0.2:7070", capacity(2, 80)).await;
    pool.assign("loaded", Uuid::new_v4()).await;

    let picked = pool.select_executor(TaskType::Map, 5).await;
    assert_eq!(picked.as_deref(), Some("idle"));

    let pool = self::pool();
    pool.register("weak", "10.0.0.1:7070", capacity(2, 10)).await;
    pool.register("strong", "10.0.0.2:7070", capacity(2, 90)).await;
    let picked = pool.select_executor(TaskType::Reduce, 3).await;
    assert_eq!(picked.as_deref(), Some("strong"));
}

#[tokio::test]
async fn selection_ties_break_by_id() {
    let pool = pool();
    pool.register("b", "10.0.0.2:7070", capacity(2, 50)).await;
    pool.register("a", "10.0.0.1:7070", capacity(2, 50)).await;
    assert_eq!(pool.select_executor(TaskType::Map, 5).await.as_deref(), Some("a"));
}

#[tokio::test]
async fn selection_returns_none_when_nobody_qualifies() {
    let pool = pool();
    assert!(pool.select_executor(TaskType::Map, 5).await.is_none());

    pool.register("e1", "10.0.0.1:7070", capacity(1, 50)).await;
    pool.assign("e1", Uuid::new_v4()).await;
    assert!(pool.select_executor(TaskType::Map, 5).await.is_none());
}

#[tokio::test]
async fn stale_executor_goes_offline_then_reactivates_on_heartbeat() {
    let pool = ExecutorPool::new(Duration::from_millis(50), Duration::from_secs(60));
    pool.register("e1", "10.0.0.1:7070", capacity(1, 50)).await;

    tokio::time::sleep(Duration::from_millis(80)).await;
    let (offline, removed) = pool.sweep_stale().await;
    assert_eq!(offline, vec!["e1".to_string()]);
    assert!(removed.is_empty());
    assert_eq!(pool.get("e1").await.unwrap().status, ExecutorStatus::Offline);
    assert!(pool.select_executor(TaskType::Map, 5).await.is_none());

    assert!(pool.heartbeat("e1").await);
    assert_eq!(pool.get("e1").await.unwrap().status, ExecutorStatus::Ready);
    assert_eq!(pool.select_executor(TaskType::Map, 5).await.as_deref(), Some("e1"));
}

#[tokio::test]
async fn offline_executor_is_deregistered_after_retention() {
    let pool = ExecutorPool::new(Duration::from_millis(30), Duration::from_millis(80));
    pool.register("e1", "10.0.0.1:7070", capacity(1, 50)).await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    let (offline, _) = pool.sweep_stale().await;
    assert_eq!(offline.len(), 1);

    tokio::time::sleep(Duration::from_millis(60)).await;
    let (_, removed) = pool.sweep_stale().await;
    assert_eq!(removed, vec!["e1".to_string()]);
    assert!(pool.is_empty().await);
}

#[tokio::test]
async fn heartbeat_for_unknown_executor_fails() {
    let pool = pool();
    assert!(!pool.heartbeat("ghost").await);
}

#[tokio::test]
async fn deregistered_executor_is_gone() {
    let pool = pool();
    pool.register("e1", "10.0.0.1:7070", capacity(1, 50)).await;
    assert!(pool.deregister("e1").await);
    assert!(!pool.deregister("e1").await);
    assert!(pool.get("e1").await.is_none());
    assert!(!pool.heartbeat("e1").await);
}

#[tokio::test]
async fn failed_executor_is_never_selected() {
    let pool = pool();
    pool.register("e1", "10.0.0.1:7070", capacity(1, 50)).await;
    assert!(pool.mark_failed("e1").await);
    assert!(pool.select_executor(TaskType::Map, 5).await.is_none());
    assert!(!pool.is_healthy("e1").await);

    let stats = pool.stats().await;
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.ready, 0);
}
