use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::ControlConfig;
use crate::dashboard::{run_dashboard, DashboardState};
use crate::error::Result;
use crate::orchestrator::{Job, JobOrchestrator, JobSpec, JobStatus};
use crate::partition::PartitionProvider;
use crate::pool::{Capacity, ExecutorPool};
use crate::sched::{Task, TaskScheduler};
use crate::snapshot::ControlSnapshot;

/// The assembled control plane: executor pool, task scheduler, and job
/// orchestrator wired bottom-up, plus the periodic loops that drive them.
///
/// Public methods are the transport-agnostic inbound surface; an RPC or
/// HTTP layer in front of this struct is somebody else's concern.
pub struct ControlPlane {
    config: ControlConfig,
    pool: Arc<ExecutorPool>,
    scheduler: Arc<TaskScheduler>,
    orchestrator: Arc<JobOrchestrator>,
}

impl ControlPlane {
    pub fn new(config: ControlConfig, partitioner: Arc<dyn PartitionProvider>) -> Self {
        let pool = Arc::new(ExecutorPool::new(
            config.executor_timeout,
            config.offline_retention,
        ));
        let scheduler = Arc::new(TaskScheduler::new(
            pool.clone(),
            config.task_timeout,
            config.max_task_retries,
        ));
        let orchestrator = Arc::new(JobOrchestrator::new(
            scheduler.clone(),
            partitioner,
            config.max_concurrent_jobs,
            config.map_priority,
            config.reduce_priority,
        ));
        Self {
            config,
            pool,
            scheduler,
            orchestrator,
        }
    }

    pub fn pool(&self) -> &Arc<ExecutorPool> {
        &self.pool
    }

    pub fn scheduler(&self) -> &Arc<TaskScheduler> {
        &self.scheduler
    }

    pub fn orchestrator(&self) -> &Arc<JobOrchestrator> {
        &self.orchestrator
    }

    // Inbound surface, executor side.

    pub async fn register_executor(&self, id: &str, address: &str, capacity: Capacity) -> bool {
        self.pool.register(id, address, capacity).await
    }

    pub async fn heartbeat(&self, executor_id: &str) -> bool {
        self.pool.heartbeat(executor_id).await
    }

    pub async fn report_task_completion(
        &self,
        task_id: &Uuid,
        executor_id: &str,
        output: Option<String>,
    ) -> bool {
        self.scheduler
            .report_completion(task_id, executor_id, true, output)
            .await
    }

    pub async fn report_task_failure(
        &self,
        task_id: &Uuid,
        executor_id: &str,
        error: Option<String>,
    ) -> bool {
        self.scheduler
            .report_completion(task_id, executor_id, false, error)
            .await
    }

    /// Poll-style pull: a registered executor asks for its next task.
    pub async fn request_task(&self, executor_id: &str) -> Option<Task> {
        self.scheduler.request_task(executor_id).await
    }

    // Inbound surface, client side.

    pub async fn submit_job(&self, spec: JobSpec) -> Result<Uuid> {
        self.orchestrator.submit(spec).await
    }

    pub async fn job_status(&self, job_id: &Uuid) -> Option<JobStatus> {
        self.orchestrator.job_status(job_id).await
    }

    pub async fn get_job(&self, job_id: &Uuid) -> Option<Job> {
        self.orchestrator.get_job(job_id).await
    }

    pub async fn cancel_job(&self, job_id: &Uuid, reason: &str) -> bool {
        self.orchestrator.cancel(job_id, reason).await
    }

    // Outbound surface, persistence side.

    pub async fn snapshot(&self) -> ControlSnapshot {
        ControlSnapshot::new(
            self.pool.snapshot_records().await,
            self.orchestrator.snapshot_records().await,
            self.scheduler.snapshot_records().await,
        )
    }

    pub async fn restore(&self, snapshot: ControlSnapshot) -> Result<()> {
        if !snapshot.is_compatible() {
            return Err(crate::error::ControlError::Internal(format!(
                "incompatible snapshot version {}",
                snapshot.version
            )));
        }
        self.pool.restore(snapshot.executors).await;
        self.scheduler.restore(snapshot.tasks).await;
        self.orchestrator.restore(snapshot.jobs).await;
        tracing::info!(taken_at = %snapshot.taken_at, "Control-plane state restored");
        Ok(())
    }

    /// Run the periodic loops until the token is cancelled:
    ///
    /// 1. Heartbeat sweep: marks stale executors offline, prunes them.
    /// 2. Scheduling pass: matches queued tasks to executors.
    /// 3. Timeout sweep: reassigns tasks on lost or stuck executors.
    /// 4. Progress check: drives job phase transitions.
    ///
    /// Each loop owns one duty and talks to the components only through
    /// their public interfaces, so the loops never contend on more than one
    /// collection at a time. The optional dashboard is spawned alongside.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let pool = self.pool.clone();
        let heartbeat_interval = self.config.heartbeat_interval;
        let heartbeat_token = shutdown.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(heartbeat_interval);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        pool.sweep_stale().await;
                    }
                    _ = heartbeat_token.cancelled() => break,
                }
            }
        });

        let scheduler = self.scheduler.clone();
        let scheduling_interval = self.config.scheduling_interval;
        let scheduling_token = shutdown.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(scheduling_interval);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let assigned = scheduler.scheduling_pass().await;
                        if assigned > 0 {
                            tracing::debug!(assigned, "Scheduling pass");
                        }
                    }
                    _ = scheduling_token.cancelled() => break,
                }
            }
        });

        let sweeper = self.scheduler.clone();
        let sweep_interval = self.config.task_timeout;
        let sweep_token = shutdown.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(sweep_interval);
            // The first tick fires immediately; skip it so a fresh start
            // does not sweep before anything can have timed out.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let reassigned = sweeper.timeout_sweep().await;
                        if reassigned > 0 {
                            tracing::info!(reassigned, "Timeout sweep reassigned tasks");
                        }
                    }
                    _ = sweep_token.cancelled() => break,
                }
            }
        });

        let orchestrator = self.orchestrator.clone();
        let progress_interval = self.config.progress_interval;
        let progress_token = shutdown.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(progress_interval);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        orchestrator.progress_check().await;
                    }
                    _ = progress_token.cancelled() => break,
                }
            }
        });

        if let Some(addr) = self.config.dashboard_addr {
            let state = DashboardState {
                pool: self.pool.clone(),
                scheduler: self.scheduler.clone(),
                orchestrator: self.orchestrator.clone(),
            };
            let dashboard_token = shutdown.clone();
            tokio::spawn(async move {
                run_dashboard(addr, state, dashboard_token).await;
            });
        }

        shutdown.cancelled().await;
        tracing::info!("Control plane stopped");
    }
}
