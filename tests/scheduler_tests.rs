use std::sync::Arc;
use std::time::Duration;

use gridbatch::pool::{Capacity, ExecutorPool};
use gridbatch::sched::{Task, TaskScheduler, TaskStatus, TaskType};
use uuid::Uuid;

fn capacity(max_tasks: usize) -> Capacity {
    Capacity::new(4, 8192, 100, 50).with_max_concurrent_tasks(max_tasks)
}

/// Pool with a generous health timeout so only capacity limits placement.
fn healthy_setup(task_timeout: Duration, max_retries: u32) -> (Arc<ExecutorPool>, TaskScheduler) {
    let pool = Arc::new(ExecutorPool::new(
        Duration::from_secs(30),
        Duration::from_secs(60),
    ));
    let scheduler = TaskScheduler::new(pool.clone(), task_timeout, max_retries);
    (pool, scheduler)
}

fn map_task(job_id: Uuid, priority: i32) -> Task {
    Task::new(job_id, TaskType::Map, "input_chunk", "map_fn", priority)
}

#[tokio::test]
async fn capacity_bounded_pass_leaves_remainder_pending() {
    let (pool, scheduler) = healthy_setup(Duration::from_secs(60), 3);
    pool.register("e1", "10.0.0.1:7070", capacity(1)).await;
    pool.register("e2", "10.0.0.2:7070", capacity(2)).await;

    let job_id = Uuid::new_v4();
    let tasks: Vec<Task> = (0..4).map(|_| map_task(job_id, 5)).collect();
    let ids: Vec<Uuid> = tasks.iter().map(|t| t.id).collect();
    for task in tasks {
        assert!(scheduler.enqueue(task).await);
    }

    let assigned = scheduler.scheduling_pass().await;
    assert_eq!(assigned, 3);

    assert_eq!(pool.load_of("e1").await, Some(1));
    assert_eq!(pool.load_of("e2").await, Some(2));

    let mut pending = 0;
    for id in &ids {
        let task = scheduler.get_task(id).await.unwrap();
        match task.status {
            TaskStatus::Assigned => {
                // An in-flight task is held by exactly the executor recorded
                // on the task.
                let holder = pool.holder_of(id).await.unwrap();
                assert_eq!(task.assigned_executor.as_deref(), Some(holder.as_str()));
            }
            TaskStatus::Pending => {
                pending += 1;
                assert!(pool.holder_of(id).await.is_none());
            }
            other => panic!("unexpected status {other}"),
        }
    }
    assert_eq!(pending, 1);

    // No capacity left: another pass assigns nothing.
    assert_eq!(scheduler.scheduling_pass().await, 0);
}

#[tokio::test]
async fn higher_priority_is_scheduled_first() {
    let (pool, scheduler) = healthy_setup(Duration::from_secs(60), 3);
    pool.register("e1", "10.0.0.1:7070", capacity(1)).await;

    let job_id = Uuid::new_v4();
    let low = map_task(job_id, 1);
    let high = map_task(job_id, 9);
    let (low_id, high_id) = (low.id, high.id);
    scheduler.enqueue(low).await;
    scheduler.enqueue(high).await;

    assert_eq!(scheduler.scheduling_pass().await, 1);
    assert_eq!(
        scheduler.get_task(&high_id).await.unwrap().status,
        TaskStatus::Assigned
    );
    assert_eq!(
        scheduler.get_task(&low_id).await.unwrap().status,
        TaskStatus::Pending
    );
}

#[tokio::test]
async fn map_queue_drains_before_reduce_queue() {
    let (pool, scheduler) = healthy_setup(Duration::from_secs(60), 3);
    pool.register("e1", "10.0.0.1:7070", capacity(1)).await;

    let job_id = Uuid::new_v4();
    // Reduce queued first and with a higher priority, but map still wins.
    let reduce = Task::new(job_id, TaskType::Reduce, "part_0", "reduce_fn", 9);
    let map = map_task(job_id, 1);
    let (reduce_id, map_id) = (reduce.id, map.id);
    scheduler.enqueue(reduce).await;
    scheduler.enqueue(map).await;

    assert_eq!(scheduler.scheduling_pass().await, 1);
    assert_eq!(
        scheduler.get_task(&map_id).await.unwrap().status,
        TaskStatus::Assigned
    );
    assert_eq!(
        scheduler.get_task(&reduce_id).await.unwrap().status,
        TaskStatus::Pending
    );
}

#[tokio::test]
async fn start_acknowledgement_marks_the_task_running() {
    let (pool, scheduler) = healthy_setup(Duration::from_secs(60), 3);
    pool.register("e1", "10.0.0.1:7070", capacity(1)).await;

    let task = map_task(Uuid::new_v4(), 5);
    let task_id = task.id;
    scheduler.enqueue(task).await;
    scheduler.scheduling_pass().await;

    // Only the holding executor can acknowledge the start.
    assert!(!scheduler.start_task(&task_id, "e2").await);
    assert!(scheduler.start_task(&task_id, "e1").await);

    let task = scheduler.get_task(&task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Running);
    assert!(task.started_at.is_some());
}

#[tokio::test]
async fn duplicate_enqueue_is_rejected() {
    let (_pool, scheduler) = healthy_setup(Duration::from_secs(60), 3);
    let task = map_task(Uuid::new_v4(), 5);
    assert!(scheduler.enqueue(task.clone()).await);
    assert!(!scheduler.enqueue(task).await);
}

#[tokio::test]
async fn completion_report_from_wrong_executor_is_discarded() {
    let (pool, scheduler) = healthy_setup(Duration::from_secs(60), 3);
    pool.register("e1", "10.0.0.1:7070", capacity(1)).await;
    pool.register("e2", "10.0.0.2:7070", capacity(1)).await;

    let task = map_task(Uuid::new_v4(), 5);
    let task_id = task.id;
    scheduler.enqueue(task).await;
    scheduler.scheduling_pass().await;

    let holder = pool.holder_of(&task_id).await.unwrap();
    let imposter = if holder == "e1" { "e2" } else { "e1" };

    assert!(
        !scheduler
            .report_completion(&task_id, imposter, true, None)
            .await
    );
    assert!(scheduler.get_task(&task_id).await.unwrap().is_in_flight());

    assert!(
        scheduler
            .report_completion(&task_id, &holder, true, Some("out".into()))
            .await
    );
    let task = scheduler.get_task(&task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.output.as_deref(), Some("out"));
    assert_eq!(pool.load_of(&holder).await, Some(0));

    // Duplicate report for a settled task is discarded too.
    assert!(
        !scheduler
            .report_completion(&task_id, &holder, true, None)
            .await
    );
}

#[tokio::test]
async fn failure_report_is_terminal_for_the_task() {
    let (pool, scheduler) = healthy_setup(Duration::from_secs(60), 3);
    pool.register("e1", "10.0.0.1:7070", capacity(1)).await;

    let task = map_task(Uuid::new_v4(), 5);
    let task_id = task.id;
    scheduler.enqueue(task).await;
    scheduler.scheduling_pass().await;

    assert!(
        scheduler
            .report_completion(&task_id, "e1", false, Some("oom".into()))
            .await
    );
    let task = scheduler.get_task(&task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.error.as_deref(), Some("oom"));
    assert_eq!(pool.get("e1").await.unwrap().failed_tasks, 1);
}

#[tokio::test]
async fn lost_executor_task_is_reassigned_to_healthy_one() {
    // Short health timeout, long task timeout: only executor loss triggers.
    let pool = Arc::new(ExecutorPool::new(
        Duration::from_millis(80),
        Duration::from_secs(60),
    ));
    let scheduler = TaskScheduler::new(pool.clone(), Duration::from_secs(60), 3);

    pool.register("e1", "10.0.0.1:7070", capacity(1)).await;
    let task = map_task(Uuid::new_v4(), 5);
    let task_id = task.id;
    scheduler.enqueue(task).await;
    scheduler.scheduling_pass().await;
    assert_eq!(pool.holder_of(&task_id).await.as_deref(), Some("e1"));

    // e1 stops heartbeating; e2 arrives and stays fresh.
    tokio::time::sleep(Duration::from_millis(100)).await;
    pool.register("e2", "10.0.0.2:7070", capacity(1)).await;

    assert_eq!(scheduler.timeout_sweep().await, 1);

    let task = scheduler.get_task(&task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Assigned);
    assert_eq!(task.assigned_executor.as_deref(), Some("e2"));
    assert_eq!(pool.holder_of(&task_id).await.as_deref(), Some("e2"));
    assert_eq!(pool.get("e1").await.unwrap().failed_tasks, 1);
}

#[tokio::test]
async fn reassignment_without_candidates_requeues_the_task() {
    let pool = Arc::new(ExecutorPool::new(
        Duration::from_millis(80),
        Duration::from_secs(60),
    ));
    let scheduler = TaskScheduler::new(pool.clone(), Duration::from_secs(60), 3);

    pool.register("e1", "10.0.0.1:7070", capacity(1)).await;
    let task = map_task(Uuid::new_v4(), 5);
    let task_id = task.id;
    scheduler.enqueue(task).await;
    scheduler.scheduling_pass().await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(scheduler.timeout_sweep().await, 1);

    // Never lost: the task is traceable and back to Pending.
    let task = scheduler.get_task(&task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
    assert!(task.assigned_executor.is_none());
    assert!(pool.holder_of(&task_id).await.is_none());
}

#[tokio::test]
async fn stuck_task_exceeding_timeout_is_reassigned() {
    let pool = Arc::new(ExecutorPool::new(
        Duration::from_secs(30),
        Duration::from_secs(60),
    ));
    let scheduler = TaskScheduler::new(pool.clone(), Duration::from_millis(50), 3);

    pool.register("e1", "10.0.0.1:7070", capacity(1)).await;
    pool.register("e2", "10.0.0.2:7070", capacity(1)).await;
    let task = map_task(Uuid::new_v4(), 5);
    let task_id = task.id;
    scheduler.enqueue(task).await;
    scheduler.scheduling_pass().await;
    let first_holder = pool.holder_of(&task_id).await.unwrap();

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(scheduler.timeout_sweep().await, 1);

    let second_holder = pool.holder_of(&task_id).await.unwrap();
    assert_ne!(first_holder, second_holder);
    assert_eq!(scheduler.get_task(&task_id).await.unwrap().attempts, 2);
}

#[tokio::test]
async fn retry_exhaustion_fails_the_task() {
    let pool = Arc::new(ExecutorPool::new(
        Duration::from_secs(30),
        Duration::from_secs(60),
    ));
    // Zero retries: the first reassignment attempt is already too many.
    let scheduler = TaskScheduler::new(pool.clone(), Duration::from_millis(40), 0);

    pool.register("e1", "10.0.0.1:7070", capacity(1)).await;
    let task = map_task(Uuid::new_v4(), 5);
    let task_id = task.id;
    scheduler.enqueue(task).await;
    scheduler.scheduling_pass().await;

    tokio::time::sleep(Duration::from_millis(60)).await;
    scheduler.timeout_sweep().await;

    let task = scheduler.get_task(&task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.error.as_deref().unwrap().contains("retries exhausted"));
    assert_eq!(pool.load_of("e1").await, Some(0));
}

#[tokio::test]
async fn request_task_pulls_best_queued_work() {
    let (pool, scheduler) = healthy_setup(Duration::from_secs(60), 3);
    pool.register("e1", "10.0.0.1:7070", capacity(1)).await;

    let job_id = Uuid::new_v4();
    let reduce = Task::new(job_id, TaskType::Reduce, "part_0", "reduce_fn", 3);
    let map = map_task(job_id, 5);
    let map_id = map.id;
    scheduler.enqueue(reduce).await;
    scheduler.enqueue(map).await;

    let pulled = scheduler.request_task("e1").await.unwrap();
    assert_eq!(pulled.id, map_id);
    assert_eq!(pulled.status, TaskStatus::Running);
    assert_eq!(pulled.assigned_executor.as_deref(), Some("e1"));
    assert_eq!(pool.load_of("e1").await, Some(1));

    // At capacity now; the reduce task stays queued.
    assert!(scheduler.request_task("e1").await.is_none());
    assert!(scheduler.request_task("ghost").await.is_none());
}

#[tokio::test]
async fn cancelled_job_tasks_are_skipped_by_the_pass() {
    let (pool, scheduler) = healthy_setup(Duration::from_secs(60), 3);
    pool.register("e1", "10.0.0.1:7070", capacity(4)).await;

    let job_id = Uuid::new_v4();
    let tasks: Vec<Task> = (0..3).map(|_| map_task(job_id, 5)).collect();
    let ids: Vec<Uuid> = tasks.iter().map(|t| t.id).collect();
    for task in tasks {
        scheduler.enqueue(task).await;
    }

    assert_eq!(scheduler.cancel_tasks_for_job(&job_id).await, 3);
    assert_eq!(scheduler.scheduling_pass().await, 0);
    for id in &ids {
        assert_eq!(
            scheduler.get_task(id).await.unwrap().status,
            TaskStatus::Cancelled
        );
    }
    assert_eq!(pool.load_of("e1").await, Some(0));
}

#[tokio::test]
async fn stats_track_queue_and_flight_counts() {
    let (pool, scheduler) = healthy_setup(Duration::from_secs(60), 3);
    pool.register("e1", "10.0.0.1:7070", capacity(1)).await;

    let job_id = Uuid::new_v4();
    scheduler.enqueue(map_task(job_id, 5)).await;
    scheduler
        .enqueue(Task::new(job_id, TaskType::Reduce, "p", "r", 3))
        .await;

    let stats = scheduler.stats().await;
    assert_eq!(stats.queued_map, 1);
    assert_eq!(stats.queued_reduce, 1);
    assert_eq!(stats.in_flight, 0);

    scheduler.scheduling_pass().await;
    let stats = scheduler.stats().await;
    assert_eq!(stats.in_flight, 1);
    assert_eq!(stats.total_scheduled, 1);
}
