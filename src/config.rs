use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{ControlError, Result};

/// Tunables for the control plane.
///
/// Defaults mirror a small on-prem cluster: executors heartbeat every few
/// seconds, the scheduler matches queued tasks every 2 seconds, and stalled
/// tasks are only declared lost after 5 minutes so short network blips do
/// not trigger spurious reassignment.
#[derive(Debug, Clone)]
pub struct ControlConfig {
    /// How often the pool scans executor heartbeats.
    pub heartbeat_interval: Duration,
    /// Heartbeat age beyond which an executor is considered offline.
    pub executor_timeout: Duration,
    /// How long an offline executor is retained before it is deregistered.
    pub offline_retention: Duration,
    /// How often the scheduler runs a matching pass.
    pub scheduling_interval: Duration,
    /// In-flight age beyond which a task is reassigned; also the sweep cadence.
    pub task_timeout: Duration,
    /// How often the orchestrator checks job phase progress.
    pub progress_interval: Duration,
    /// Admission ceiling on concurrently active jobs.
    pub max_concurrent_jobs: usize,
    /// Reassignment attempts before a task is failed for good.
    pub max_task_retries: u32,
    /// Target partition size used to derive map-task counts.
    pub partition_size_mb: u64,
    /// Priority given to map tasks at creation.
    pub map_priority: i32,
    /// Priority given to reduce tasks at creation.
    pub reduce_priority: i32,
    /// Address for the read-only status dashboard, if enabled.
    pub dashboard_addr: Option<SocketAddr>,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(10),
            executor_timeout: Duration::from_secs(30),
            offline_retention: Duration::from_secs(60),
            scheduling_interval: Duration::from_secs(2),
            task_timeout: Duration::from_secs(300),
            progress_interval: Duration::from_secs(5),
            max_concurrent_jobs: 10,
            max_task_retries: 3,
            partition_size_mb: 64,
            map_priority: 5,
            reduce_priority: 3,
            dashboard_addr: None,
        }
    }
}

impl ControlConfig {
    /// Millisecond-scale timings for tests that exercise timeout paths.
    pub fn for_tests() -> Self {
        Self {
            heartbeat_interval: Duration::from_millis(20),
            executor_timeout: Duration::from_millis(100),
            offline_retention: Duration::from_millis(200),
            scheduling_interval: Duration::from_millis(20),
            task_timeout: Duration::from_millis(200),
            progress_interval: Duration::from_millis(20),
            ..Default::default()
        }
    }

    pub fn with_max_concurrent_jobs(mut self, limit: usize) -> Self {
        self.max_concurrent_jobs = limit;
        self
    }

    pub fn with_max_task_retries(mut self, retries: u32) -> Self {
        self.max_task_retries = retries;
        self
    }

    pub fn with_executor_timeout(mut self, timeout: Duration) -> Self {
        self.executor_timeout = timeout;
        self
    }

    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    pub fn with_dashboard_addr(mut self, addr: SocketAddr) -> Self {
        self.dashboard_addr = Some(addr);
        self
    }

    /// Reject configurations the periodic loops cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_interval.is_zero()
            || self.scheduling_interval.is_zero()
            || self.task_timeout.is_zero()
            || self.progress_interval.is_zero()
        {
            return Err(ControlError::InvalidConfig(
                "intervals must be non-zero".to_string(),
            ));
        }
        if self.max_concurrent_jobs == 0 {
            return Err(ControlError::InvalidConfig(
                "max_concurrent_jobs must be at least 1".to_string(),
            ));
        }
        if self.partition_size_mb == 0 {
            return Err(ControlError::InvalidConfig(
                "partition_size_mb must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
