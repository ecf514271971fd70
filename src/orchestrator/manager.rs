use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{ControlError, Result};
use crate::orchestrator::job::{Job, JobSpec, JobStatus};
use crate::partition::PartitionProvider;
use crate::sched::task::{Task, TaskType};
use crate::sched::TaskScheduler;

#[derive(Debug, Clone, Default, Serialize)]
pub struct OrchestratorStats {
    pub active: usize,
    pub total_submitted: u64,
    pub total_completed: u64,
    pub total_failed: u64,
    pub total_cancelled: u64,
}

#[derive(Default)]
struct OrchInner {
    jobs: HashMap<Uuid, Job>,
    /// Terminal jobs whose counters are recorded; removed on the next pass.
    retired: HashSet<Uuid>,
    total_submitted: u64,
    total_completed: u64,
    total_failed: u64,
    total_cancelled: u64,
}

/// Owns job identity and the map-to-reduce phase transition.
///
/// Decomposes an accepted job into map tasks, watches aggregate task state
/// through the scheduler's narrow read interface, and drives the job state
/// machine. Task placement is never touched here.
pub struct JobOrchestrator {
    scheduler: Arc<TaskScheduler>,
    partitioner: Arc<dyn PartitionProvider>,
    inner: RwLock<OrchInner>,
    max_concurrent_jobs: usize,
    map_priority: i32,
    reduce_priority: i32,
}

impl JobOrchestrator {
    pub fn new(
        scheduler: Arc<TaskScheduler>,
        partitioner: Arc<dyn PartitionProvider>,
        max_concurrent_jobs: usize,
        map_priority: i32,
        reduce_priority: i32,
    ) -> Self {
        Self {
            scheduler,
            partitioner,
            inner: RwLock::new(OrchInner::default()),
            max_concurrent_jobs,
            map_priority,
            reduce_priority,
        }
    }

    pub fn scheduler(&self) -> &Arc<TaskScheduler> {
        &self.scheduler
    }

    /// Admit a job and kick off its map phase: one map task per input
    /// partition, all queued with the scheduler before this returns.
    pub async fn submit(&self, spec: JobSpec) -> Result<Uuid> {
        if spec.input_refs.is_empty() {
            return Err(ControlError::EmptyJob);
        }

        let partitions: Vec<String> = spec
            .input_refs
            .iter()
            .flat_map(|input| self.partitioner.partitions(input))
            .collect();

        let (job_id, map_tasks) = {
            let mut inner = self.inner.write().await;
            if inner.jobs.len() >= self.max_concurrent_jobs {
                return Err(ControlError::TooManyJobs {
                    limit: self.max_concurrent_jobs,
                });
            }

            let mut job = Job::from_spec(spec);
            let map_tasks: Vec<Task> = partitions
                .iter()
                .map(|partition| {
                    Task::new(
                        job.id,
                        TaskType::Map,
                        partition.clone(),
                        job.map_function.clone(),
                        self.map_priority,
                    )
                })
                .collect();
            job.start_map_phase(map_tasks.iter().map(|t| t.id).collect());

            let job_id = job.id;
            inner.jobs.insert(job_id, job);
            inner.total_submitted += 1;
            (job_id, map_tasks)
        };

        let task_count = map_tasks.len();
        for task in map_tasks {
            self.scheduler.enqueue(task).await;
        }
        tracing::info!(
            job_id = %job_id,
            map_tasks = task_count,
            "Job submitted, map phase started"
        );
        Ok(job_id)
    }

    /// One progress pass over the active jobs.
    ///
    /// Jobs that went terminal on the previous pass are dropped first (their
    /// counters were recorded when they transitioned). Then each active job
    /// is checked against the scheduler's per-phase tallies: a finished map
    /// phase spawns the reduce tasks, any failed task fails the job, and a
    /// finished reduce phase completes it.
    pub async fn progress_check(&self) {
        {
            let mut inner = self.inner.write().await;
            let retired: Vec<Uuid> = inner.retired.drain().collect();
            for job_id in retired {
                inner.jobs.remove(&job_id);
                tracing::debug!(job_id = %job_id, "Terminal job removed from active set");
            }
        }

        let active: Vec<(Uuid, JobStatus)> = {
            let inner = self.inner.read().await;
            inner
                .jobs
                .values()
                .filter(|j| !j.status.is_terminal())
                .map(|j| (j.id, j.status))
                .collect()
        };

        for (job_id, status) in active {
            match status {
                JobStatus::MapPhase => {
                    let counts = self.scheduler.phase_counts(&job_id, TaskType::Map).await;
                    if counts.failed > 0 {
                        self.fail_job(&job_id, "map task failed").await;
                    } else if counts.all_completed() {
                        self.begin_reduce_phase(&job_id).await;
                    }
                }
                JobStatus::ReducePhase => {
                    let counts = self
                        .scheduler
                        .phase_counts(&job_id, TaskType::Reduce)
                        .await;
                    if counts.failed > 0 {
                        self.fail_job(&job_id, "reduce task failed").await;
                    } else if counts.all_completed() {
                        self.complete_job(&job_id).await;
                    }
                }
                _ => {}
            }
        }
    }

    /// Mark a job cancelled and discard its queued tasks. In-flight tasks
    /// drain on their executors; their reports no longer affect the job.
    pub async fn cancel(&self, job_id: &Uuid, reason: &str) -> bool {
        {
            let mut inner = self.inner.write().await;
            let Some(job) = inner.jobs.get_mut(job_id) else {
                return false;
            };
            if job.status.is_terminal() {
                return false;
            }
            job.cancel(reason);
            inner.total_cancelled += 1;
            inner.retired.insert(*job_id);
        }
        self.scheduler.cancel_tasks_for_job(job_id).await;
        tracing::info!(job_id = %job_id, reason, "Job cancelled");
        true
    }

    pub async fn job_status(&self, job_id: &Uuid) -> Option<JobStatus> {
        let inner = self.inner.read().await;
        inner.jobs.get(job_id).map(|j| j.status)
    }

    pub async fn get_job(&self, job_id: &Uuid) -> Option<Job> {
        let inner = self.inner.read().await;
        inner.jobs.get(job_id).cloned()
    }

    pub async fn active_jobs(&self) -> Vec<Job> {
        let inner = self.inner.read().await;
        let mut jobs: Vec<Job> = inner.jobs.values().cloned().collect();
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }

    pub async fn stats(&self) -> OrchestratorStats {
        let inner = self.inner.read().await;
        OrchestratorStats {
            active: inner.jobs.len(),
            total_submitted: inner.total_submitted,
            total_completed: inner.total_completed,
            total_failed: inner.total_failed,
            total_cancelled: inner.total_cancelled,
        }
    }

    pub async fn snapshot_records(&self) -> Vec<Job> {
        let inner = self.inner.read().await;
        let mut jobs: Vec<Job> = inner.jobs.values().cloned().collect();
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }

    /// Rebuild the active-job set from snapshot records.
    pub async fn restore(&self, jobs: Vec<Job>) {
        let mut inner = self.inner.write().await;
        *inner = OrchInner::default();
        for job in jobs {
            inner.jobs.insert(job.id, job);
        }
    }

    /// All map tasks are done: pass through MapCompleted, create one reduce
    /// task per configured reducer against the intermediate-result refs,
    /// queue them, then enter ReducePhase.
    async fn begin_reduce_phase(&self, job_id: &Uuid) {
        let reduce_tasks = {
            let mut inner = self.inner.write().await;
            let Some(job) = inner.jobs.get_mut(job_id) else {
                return;
            };
            if job.status != JobStatus::MapPhase {
                return;
            }
            job.status = JobStatus::MapCompleted;

            let tasks: Vec<Task> = (0..job.num_reducers)
                .map(|index| {
                    Task::new(
                        job.id,
                        TaskType::Reduce,
                        self.partitioner.intermediate_ref(&job.id, index),
                        job.reduce_function.clone(),
                        self.reduce_priority,
                    )
                })
                .collect();
            job.reduce_tasks = tasks.iter().map(|t| t.id).collect();
            tasks
        };

        let reduce_count = reduce_tasks.len();
        for task in reduce_tasks {
            self.scheduler.enqueue(task).await;
        }

        let mut inner = self.inner.write().await;
        if let Some(job) = inner.jobs.get_mut(job_id) {
            if job.status == JobStatus::MapCompleted {
                job.status = JobStatus::ReducePhase;
            }
        }
        tracing::info!(
            job_id = %job_id,
            reduce_tasks = reduce_count,
            "Map phase complete, reduce phase started"
        );
    }

    async fn fail_job(&self, job_id: &Uuid, reason: &str) {
        {
            let mut inner = self.inner.write().await;
            let Some(job) = inner.jobs.get_mut(job_id) else {
                return;
            };
            if job.status.is_terminal() {
                return;
            }
            job.fail(reason);
            inner.total_failed += 1;
            inner.retired.insert(*job_id);
        }
        // Sibling tasks still queued are pointless work now.
        self.scheduler.cancel_tasks_for_job(job_id).await;
        tracing::warn!(job_id = %job_id, reason, "Job failed");
    }

    async fn complete_job(&self, job_id: &Uuid) {
        let mut inner = self.inner.write().await;
        let Some(job) = inner.jobs.get_mut(job_id) else {
            return;
        };
        if job.status.is_terminal() {
            return;
        }
        job.complete();
        inner.total_completed += 1;
        inner.retired.insert(*job_id);
        tracing::info!(job_id = %job_id, "Job completed");
    }
}
