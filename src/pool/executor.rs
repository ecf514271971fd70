use std::collections::HashSet;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutorStatus {
    Registered,
    Ready,
    Busy,
    Offline,
    Failed,
}

impl std::fmt::Display for ExecutorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutorStatus::Registered => write!(f, "registered"),
            ExecutorStatus::Ready => write!(f, "ready"),
            ExecutorStatus::Busy => write!(f, "busy"),
            ExecutorStatus::Offline => write!(f, "offline"),
            ExecutorStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Declared capacity of an executor, reported at registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capacity {
    pub cpu_cores: u32,
    pub memory_mb: u64,
    pub disk_gb: u64,
    /// Synthetic compute score, 1-100.
    pub compute_power: u8,
    pub max_concurrent_tasks: usize,
}

impl Capacity {
    pub fn new(cpu_cores: u32, memory_mb: u64, disk_gb: u64, compute_power: u8) -> Self {
        Self {
            cpu_cores,
            memory_mb,
            disk_gb,
            compute_power: compute_power.clamp(1, 100),
            max_concurrent_tasks: 1,
        }
    }

    pub fn with_max_concurrent_tasks(mut self, max: usize) -> Self {
        self.max_concurrent_tasks = max.max(1);
        self
    }
}

/// A remote compute executor as the pool sees it.
///
/// Owned exclusively by the [`ExecutorPool`](super::ExecutorPool); mutated
/// only through its assign/release/heartbeat operations.
#[derive(Debug, Clone)]
pub struct Executor {
    pub id: String,
    pub address: String,
    pub capacity: Capacity,
    pub status: ExecutorStatus,
    pub registered_at: DateTime<Utc>,
    last_heartbeat: Instant,
    in_flight: HashSet<Uuid>,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
    pub total_execution_ms: u64,
}

impl Executor {
    pub fn new(id: impl Into<String>, address: impl Into<String>, capacity: Capacity) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            capacity,
            status: ExecutorStatus::Registered,
            registered_at: Utc::now(),
            last_heartbeat: Instant::now(),
            in_flight: HashSet::new(),
            completed_tasks: 0,
            failed_tasks: 0,
            total_execution_ms: 0,
        }
    }

    pub fn load(&self) -> usize {
        self.in_flight.len()
    }

    pub fn in_flight(&self) -> &HashSet<Uuid> {
        &self.in_flight
    }

    pub fn heartbeat_age(&self) -> Duration {
        self.last_heartbeat.elapsed()
    }

    pub fn update_heartbeat(&mut self) {
        self.last_heartbeat = Instant::now();
    }

    /// Fresh heartbeat within the configured timeout.
    pub fn is_healthy(&self, timeout: Duration) -> bool {
        self.heartbeat_age() < timeout
    }

    /// Ready and below its concurrency ceiling.
    pub fn has_spare_capacity(&self) -> bool {
        self.status == ExecutorStatus::Ready && self.load() < self.capacity.max_concurrent_tasks
    }

    /// Fraction of concurrency headroom left, 0.0 to 1.0.
    pub fn availability(&self) -> f64 {
        if self.capacity.max_concurrent_tasks == 0 {
            return 0.0;
        }
        (1.0 - self.load() as f64 / self.capacity.max_concurrent_tasks as f64).max(0.0)
    }

    /// Placement score: 40% spare capacity, 30% health, 30% declared power.
    /// Higher is a better candidate.
    pub fn priority_score(&self, timeout: Duration) -> f64 {
        let availability = self.availability();
        let health = if self.is_healthy(timeout) { 1.0 } else { 0.0 };
        let performance = f64::from(self.capacity.compute_power) / 100.0;
        availability * 0.4 + health * 0.3 + performance * 0.3
    }

    /// Take a task. Fails at capacity; flips to Busy when the ceiling is hit.
    pub fn assign_task(&mut self, task_id: Uuid) -> bool {
        if !self.has_spare_capacity() {
            return false;
        }
        self.in_flight.insert(task_id);
        if self.load() >= self.capacity.max_concurrent_tasks {
            self.status = ExecutorStatus::Busy;
        }
        true
    }

    /// Drop a task. Fails if the task is not held here.
    pub fn release_task(&mut self, task_id: &Uuid) -> bool {
        if !self.in_flight.remove(task_id) {
            return false;
        }
        if self.status == ExecutorStatus::Busy && self.load() < self.capacity.max_concurrent_tasks {
            self.status = ExecutorStatus::Ready;
        }
        true
    }

    pub fn record_completion(&mut self, execution_ms: u64) {
        self.completed_tasks += 1;
        self.total_execution_ms += execution_ms;
    }

    pub fn record_failure(&mut self) {
        self.failed_tasks += 1;
    }
}

/// Serializable form of an [`Executor`] for snapshots and the dashboard.
///
/// Heartbeat recency is monotonic-clock state and is not carried across a
/// restore; restored executors start with a fresh heartbeat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorRecord {
    pub id: String,
    pub address: String,
    pub capacity: Capacity,
    pub status: ExecutorStatus,
    pub registered_at: DateTime<Utc>,
    pub load: usize,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
    pub total_execution_ms: u64,
}

impl ExecutorRecord {
    pub fn from_executor(executor: &Executor) -> Self {
        Self {
            id: executor.id.clone(),
            address: executor.address.clone(),
            capacity: executor.capacity.clone(),
            status: executor.status,
            registered_at: executor.registered_at,
            load: executor.load(),
            completed_tasks: executor.completed_tasks,
            failed_tasks: executor.failed_tasks,
            total_execution_ms: executor.total_execution_ms,
        }
    }
}

impl Executor {
    /// Rebuild from a snapshot record. The in-flight set comes back empty:
    /// placement is re-derived by the scheduler, which re-queues any task
    /// that was in flight when the snapshot was taken.
    pub fn from_record(record: ExecutorRecord) -> Self {
        let status = match record.status {
            ExecutorStatus::Busy => ExecutorStatus::Ready,
            other => other,
        };
        Self {
            id: record.id,
            address: record.address,
            capacity: record.capacity,
            status,
            registered_at: record.registered_at,
            last_heartbeat: Instant::now(),
            in_flight: HashSet::new(),
            completed_tasks: record.completed_tasks,
            failed_tasks: record.failed_tasks,
            total_execution_ms: record.total_execution_ms,
        }
    }
}
