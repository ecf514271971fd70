use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::pool::ExecutorPool;
use crate::sched::queue::TaskQueue;
use crate::sched::task::{Task, TaskStatus, TaskType};

/// Scheduler-wide counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerStats {
    pub queued_map: usize,
    pub queued_reduce: usize,
    pub in_flight: usize,
    pub total_scheduled: u64,
    pub total_completed: u64,
    pub total_failed: u64,
    pub total_reassigned: u64,
}

/// Per-job completion tally for one task type.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhaseCounts {
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
}

impl PhaseCounts {
    pub fn all_completed(&self) -> bool {
        self.total > 0 && self.completed == self.total
    }
}

#[derive(Debug)]
struct InFlight {
    executor_id: String,
    since: Instant,
}

#[derive(Debug, Default)]
struct SchedInner {
    tasks: HashMap<Uuid, Task>,
    map_queue: TaskQueue,
    reduce_queue: TaskQueue,
    in_flight: HashMap<Uuid, InFlight>,
    total_scheduled: u64,
    total_completed: u64,
    total_failed: u64,
    total_reassigned: u64,
}

impl SchedInner {
    fn queue_mut(&mut self, task_type: TaskType) -> &mut TaskQueue {
        match task_type {
            TaskType::Map => &mut self.map_queue,
            TaskType::Reduce => &mut self.reduce_queue,
        }
    }

    /// Pop the best still-pending entry from one queue, skipping ids whose
    /// task has since been cancelled.
    fn pop_pending(&mut self, task_type: TaskType) -> Option<(Uuid, i32)> {
        loop {
            let id = self.queue_mut(task_type).pop()?;
            if let Some(task) = self.tasks.get(&id) {
                if task.status == TaskStatus::Pending {
                    return Some((id, task.priority));
                }
            }
        }
    }
}

/// Owns the pending-task queues and in-flight placement, matches tasks to
/// executors through the pool, and recovers lost or stuck tasks.
///
/// Placement is cheap and frequent (the scheduling pass); failure detection
/// runs on a much longer cadence (the timeout sweep) so short heartbeat
/// blips do not cause spurious reassignment.
///
/// The scheduler never holds its own lock while calling into the pool: a
/// task is popped into a local, the pool is consulted, and the result is
/// committed (or the task pushed back) under a fresh lock.
#[derive(Debug)]
pub struct TaskScheduler {
    pool: Arc<ExecutorPool>,
    inner: RwLock<SchedInner>,
    task_timeout: Duration,
    max_retries: u32,
}

impl TaskScheduler {
    pub fn new(pool: Arc<ExecutorPool>, task_timeout: Duration, max_retries: u32) -> Self {
        Self {
            pool,
            inner: RwLock::new(SchedInner::default()),
            task_timeout,
            max_retries,
        }
    }

    pub fn pool(&self) -> &Arc<ExecutorPool> {
        &self.pool
    }

    /// Accept a task into its per-type queue. Rejects duplicate task ids.
    pub async fn enqueue(&self, task: Task) -> bool {
        let mut inner = self.inner.write().await;
        if inner.tasks.contains_key(&task.id) {
            tracing::warn!(task_id = %task.id, "Duplicate task rejected");
            return false;
        }
        let (id, task_type, priority) = (task.id, task.task_type, task.priority);
        inner.tasks.insert(id, task);
        inner.queue_mut(task_type).push(id, priority);
        tracing::debug!(task_id = %id, task_type = %task_type, priority, "Task queued");
        true
    }

    /// One matching pass. The map queue is fully drained before the reduce
    /// queue; within a queue, tasks go out in priority-then-FIFO order and
    /// the pass stops at the first task no executor can take, so nothing
    /// skips ahead. Returns the number of assignments made.
    pub async fn scheduling_pass(&self) -> usize {
        let mut assigned = 0;
        for task_type in [TaskType::Map, TaskType::Reduce] {
            loop {
                let candidate = {
                    let mut inner = self.inner.write().await;
                    inner.pop_pending(task_type)
                };
                let Some((task_id, priority)) = candidate else {
                    break;
                };

                let placed = match self.pool.select_executor(task_type, priority).await {
                    Some(executor_id) => {
                        if self.pool.assign(&executor_id, task_id).await {
                            Some(executor_id)
                        } else {
                            None
                        }
                    }
                    None => None,
                };

                match placed {
                    Some(executor_id) => {
                        let mut inner = self.inner.write().await;
                        if let Some(task) = inner.tasks.get_mut(&task_id) {
                            task.mark_assigned(&executor_id);
                        }
                        inner.in_flight.insert(
                            task_id,
                            InFlight {
                                executor_id: executor_id.clone(),
                                since: Instant::now(),
                            },
                        );
                        inner.total_scheduled += 1;
                        assigned += 1;
                        tracing::info!(
                            task_id = %task_id,
                            executor_id = %executor_id,
                            task_type = %task_type,
                            "Task assigned"
                        );
                    }
                    None => {
                        // No executor (or we lost the capacity race): put the
                        // task back and stop this queue for the pass.
                        let mut inner = self.inner.write().await;
                        inner.queue_mut(task_type).push(task_id, priority);
                        break;
                    }
                }
            }
        }
        assigned
    }

    /// Executor acknowledges it has begun executing an assigned task.
    pub async fn start_task(&self, task_id: &Uuid, executor_id: &str) -> bool {
        let mut inner = self.inner.write().await;
        match inner.in_flight.get(task_id) {
            Some(inflight) if inflight.executor_id == executor_id => {}
            _ => return false,
        }
        if let Some(task) = inner.tasks.get_mut(task_id) {
            task.mark_running();
            return true;
        }
        false
    }

    /// Scan in-flight tasks for a dead executor or an exceeded task timeout
    /// and reassign each hit. Returns the number of tasks reassigned.
    pub async fn timeout_sweep(&self) -> usize {
        let in_flight: Vec<(Uuid, String, Duration)> = {
            let inner = self.inner.read().await;
            inner
                .in_flight
                .iter()
                .map(|(id, inflight)| (*id, inflight.executor_id.clone(), inflight.since.elapsed()))
                .collect()
        };

        let mut reassigned = 0;
        for (task_id, executor_id, age) in in_flight {
            if age > self.task_timeout {
                self.reassign(&task_id, "task timeout exceeded").await;
                reassigned += 1;
            } else if !self.pool.is_healthy(&executor_id).await {
                self.reassign(&task_id, "executor lost").await;
                reassigned += 1;
            }
        }
        reassigned
    }

    /// Pull the task off its current executor and place it again: straight
    /// onto another executor when one qualifies, otherwise back onto its
    /// queue at its original priority. Attempts are bounded; exhausting them
    /// fails the task for good and the orchestrator fails the job.
    pub async fn reassign(&self, task_id: &Uuid, reason: &str) {
        let detached = {
            let mut inner = self.inner.write().await;
            let Some(inflight) = inner.in_flight.remove(task_id) else {
                tracing::warn!(task_id = %task_id, "Reassign requested for task not in flight");
                return;
            };
            let Some(task) = inner.tasks.get(task_id) else {
                return;
            };
            let task_type = task.task_type;
            let priority = task.priority;
            let attempts = task.attempts;
            inner.total_reassigned += 1;
            (inflight.executor_id, task_type, priority, attempts)
        };
        let (old_executor, task_type, priority, attempts) = detached;

        // The old executor gets a failure on its record; duration is unknown.
        self.pool.release(&old_executor, task_id, 0, false).await;

        if attempts > self.max_retries {
            let mut inner = self.inner.write().await;
            if let Some(task) = inner.tasks.get_mut(task_id) {
                task.mark_failed(format!("retries exhausted ({reason})"));
            }
            inner.total_failed += 1;
            tracing::warn!(task_id = %task_id, attempts, reason, "Task failed, retries exhausted");
            return;
        }

        if let Some(new_executor) = self.pool.select_executor(task_type, priority).await {
            if self.pool.assign(&new_executor, *task_id).await {
                let mut inner = self.inner.write().await;
                if let Some(task) = inner.tasks.get_mut(task_id) {
                    task.mark_assigned(&new_executor);
                }
                inner.in_flight.insert(
                    *task_id,
                    InFlight {
                        executor_id: new_executor.clone(),
                        since: Instant::now(),
                    },
                );
                inner.total_scheduled += 1;
                tracing::info!(
                    task_id = %task_id,
                    from = %old_executor,
                    to = %new_executor,
                    reason,
                    "Task reassigned"
                );
                return;
            }
        }

        // Nobody can take it right now; retry on a later pass.
        let mut inner = self.inner.write().await;
        if let Some(task) = inner.tasks.get_mut(task_id) {
            task.mark_pending();
        }
        inner.queue_mut(task_type).push(*task_id, priority);
        tracing::info!(task_id = %task_id, reason, "Task requeued, no executor available");
    }

    /// Terminal report from an executor. Reports from an executor that does
    /// not currently hold the task (stale or duplicate) are logged and
    /// discarded. An explicit failure report is terminal for the task; only
    /// executor loss goes through the bounded-retry path.
    pub async fn report_completion(
        &self,
        task_id: &Uuid,
        executor_id: &str,
        success: bool,
        payload: Option<String>,
    ) -> bool {
        let duration_ms = {
            let mut inner = self.inner.write().await;
            match inner.in_flight.get(task_id) {
                Some(inflight) if inflight.executor_id == executor_id => {}
                Some(inflight) => {
                    tracing::warn!(
                        task_id = %task_id,
                        reporter = %executor_id,
                        holder = %inflight.executor_id,
                        "Discarding completion report from non-holding executor"
                    );
                    return false;
                }
                None => {
                    tracing::warn!(
                        task_id = %task_id,
                        reporter = %executor_id,
                        "Discarding completion report for task not in flight"
                    );
                    return false;
                }
            }
            let Some(inflight) = inner.in_flight.remove(task_id) else {
                return false;
            };
            let duration_ms = inflight.since.elapsed().as_millis() as u64;
            if let Some(task) = inner.tasks.get_mut(task_id) {
                if success {
                    task.mark_completed(payload);
                } else {
                    task.mark_failed(
                        payload.unwrap_or_else(|| "executor reported failure".to_string()),
                    );
                }
            }
            if success {
                inner.total_completed += 1;
            } else {
                inner.total_failed += 1;
            }
            duration_ms
        };

        self.pool
            .release(executor_id, task_id, duration_ms, success)
            .await;
        tracing::info!(
            task_id = %task_id,
            executor_id = %executor_id,
            success,
            duration_ms,
            "Task report accepted"
        );
        true
    }

    /// Pull-style alternative to the periodic pass: a polling executor asks
    /// for work and, if it qualifies, receives the best queued task already
    /// marked Running.
    pub async fn request_task(&self, executor_id: &str) -> Option<Task> {
        if !self.pool.can_accept(executor_id).await {
            return None;
        }

        let candidate = {
            let mut inner = self.inner.write().await;
            inner
                .pop_pending(TaskType::Map)
                .map(|c| (c, TaskType::Map))
                .or_else(|| {
                    inner
                        .pop_pending(TaskType::Reduce)
                        .map(|c| (c, TaskType::Reduce))
                })
        };
        let ((task_id, priority), task_type) = candidate?;

        if !self.pool.assign(executor_id, task_id).await {
            let mut inner = self.inner.write().await;
            inner.queue_mut(task_type).push(task_id, priority);
            return None;
        }

        let mut inner = self.inner.write().await;
        inner.in_flight.insert(
            task_id,
            InFlight {
                executor_id: executor_id.to_string(),
                since: Instant::now(),
            },
        );
        inner.total_scheduled += 1;
        let task = inner.tasks.get_mut(&task_id)?;
        task.mark_assigned(executor_id);
        task.mark_running();
        tracing::info!(task_id = %task_id, executor_id = %executor_id, "Task pulled");
        Some(task.clone())
    }

    /// Discard queued tasks of a job. In-flight tasks drain naturally; the
    /// orchestrator ignores their reports once the job is terminal.
    pub async fn cancel_tasks_for_job(&self, job_id: &Uuid) -> usize {
        let mut inner = self.inner.write().await;
        let mut cancelled = 0;
        for task in inner.tasks.values_mut() {
            if task.job_id == *job_id && task.status == TaskStatus::Pending {
                task.mark_cancelled();
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            tracing::info!(job_id = %job_id, cancelled, "Queued tasks discarded");
        }
        cancelled
    }

    pub async fn get_task(&self, task_id: &Uuid) -> Option<Task> {
        let inner = self.inner.read().await;
        inner.tasks.get(task_id).cloned()
    }

    /// Completion tally for one job and task type, driving phase transitions.
    pub async fn phase_counts(&self, job_id: &Uuid, task_type: TaskType) -> PhaseCounts {
        let inner = self.inner.read().await;
        let mut counts = PhaseCounts::default();
        for task in inner.tasks.values() {
            if task.job_id != *job_id || task.task_type != task_type {
                continue;
            }
            counts.total += 1;
            match task.status {
                TaskStatus::Completed => counts.completed += 1,
                TaskStatus::Failed => counts.failed += 1,
                _ => {}
            }
        }
        counts
    }

    pub async fn stats(&self) -> SchedulerStats {
        let inner = self.inner.read().await;
        SchedulerStats {
            queued_map: inner.map_queue.len(),
            queued_reduce: inner.reduce_queue.len(),
            in_flight: inner.in_flight.len(),
            total_scheduled: inner.total_scheduled,
            total_completed: inner.total_completed,
            total_failed: inner.total_failed,
            total_reassigned: inner.total_reassigned,
        }
    }

    pub async fn snapshot_records(&self) -> Vec<Task> {
        let inner = self.inner.read().await;
        let mut tasks: Vec<Task> = inner.tasks.values().cloned().collect();
        tasks.sort_by_key(|t| t.created_at);
        tasks
    }

    /// Rebuild the task table from snapshot records. Tasks that were in
    /// flight come back Pending and re-queue; at-least-once execution makes
    /// the repeat harmless.
    pub async fn restore(&self, tasks: Vec<Task>) {
        let mut inner = self.inner.write().await;
        *inner = SchedInner::default();
        for mut task in tasks {
            if task.is_in_flight() {
                task.mark_pending();
            }
            if task.status == TaskStatus::Pending {
                inner.queue_mut(task.task_type).push(task.id, task.priority);
            }
            inner.tasks.insert(task.id, task);
        }
    }
}
