use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::pool::executor::{Capacity, Executor, ExecutorRecord, ExecutorStatus};
use crate::sched::task::TaskType;

/// Aggregate pool counters for the dashboard and snapshots.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PoolStats {
    pub registered: usize,
    pub ready: usize,
    pub busy: usize,
    pub offline: usize,
    pub failed: usize,
    pub total_registered: u64,
    pub total_assignments: u64,
}

#[derive(Debug, Default)]
struct PoolInner {
    executors: HashMap<String, Executor>,
    total_registered: u64,
    total_assignments: u64,
}

/// Authoritative registry of executors: their health, capacity, and load.
///
/// All collections live behind one lock; no method awaits anything else
/// while holding it, so callers may treat each operation as atomic.
#[derive(Debug)]
pub struct ExecutorPool {
    inner: RwLock<PoolInner>,
    executor_timeout: Duration,
    offline_retention: Duration,
}

impl ExecutorPool {
    pub fn new(executor_timeout: Duration, offline_retention: Duration) -> Self {
        Self {
            inner: RwLock::new(PoolInner::default()),
            executor_timeout,
            offline_retention,
        }
    }

    /// Register a new executor. Returns false (and mutates nothing) when the
    /// id is already taken. A fresh executor starts Ready with zero load.
    pub async fn register(&self, id: &str, address: &str, capacity: Capacity) -> bool {
        let mut inner = self.inner.write().await;
        if inner.executors.contains_key(id) {
            tracing::warn!(executor_id = %id, "Executor already registered");
            return false;
        }

        let mut executor = Executor::new(id, address, capacity);
        executor.status = ExecutorStatus::Ready;
        tracing::info!(
            executor_id = %id,
            address = %executor.address,
            max_tasks = executor.capacity.max_concurrent_tasks,
            compute_power = executor.capacity.compute_power,
            "Executor registered"
        );
        inner.executors.insert(id.to_string(), executor);
        inner.total_registered += 1;
        true
    }

    /// Remove an executor entirely.
    pub async fn deregister(&self, id: &str) -> bool {
        let mut inner = self.inner.write().await;
        if inner.executors.remove(id).is_none() {
            return false;
        }
        tracing::info!(executor_id = %id, "Executor deregistered");
        true
    }

    /// Refresh an executor's heartbeat. An Offline executor comes back
    /// Ready and is eligible for selection again.
    pub async fn heartbeat(&self, id: &str) -> bool {
        let mut inner = self.inner.write().await;
        let Some(executor) = inner.executors.get_mut(id) else {
            return false;
        };
        executor.update_heartbeat();
        if executor.status == ExecutorStatus::Offline {
            executor.status = ExecutorStatus::Ready;
            tracing::info!(executor_id = %id, "Executor reactivated");
        }
        true
    }

    /// Pick the best candidate for a task: healthy, spare capacity, highest
    /// priority score. Ties break toward the lexicographically smallest id.
    pub async fn select_executor(&self, task_type: TaskType, priority: i32) -> Option<String> {
        let inner = self.inner.read().await;
        let best = inner
            .executors
            .values()
            .filter(|e| e.has_spare_capacity() && e.is_healthy(self.executor_timeout))
            .map(|e| (e.priority_score(self.executor_timeout), &e.id))
            .max_by(|(a_score, a_id), (b_score, b_id)| {
                a_score
                    .partial_cmp(b_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| b_id.cmp(a_id))
            })
            .map(|(_, id)| id.clone());
        tracing::debug!(
            task_type = %task_type,
            priority,
            candidate = best.as_deref().unwrap_or("-"),
            "Executor selection"
        );
        best
    }

    /// Hand a task to an executor. Fails when the executor is unknown or at
    /// capacity; on success the load and in-flight set are updated together.
    pub async fn assign(&self, id: &str, task_id: Uuid) -> bool {
        let mut inner = self.inner.write().await;
        let Some(executor) = inner.executors.get_mut(id) else {
            return false;
        };
        if !executor.assign_task(task_id) {
            return false;
        }
        inner.total_assignments += 1;
        true
    }

    /// Release a task from an executor, recording the outcome in its
    /// cumulative counters. Fails if the task is not held by that executor.
    pub async fn release(&self, id: &str, task_id: &Uuid, duration_ms: u64, success: bool) -> bool {
        let mut inner = self.inner.write().await;
        let Some(executor) = inner.executors.get_mut(id) else {
            return false;
        };
        if !executor.release_task(task_id) {
            return false;
        }
        if success {
            executor.record_completion(duration_ms);
        } else {
            executor.record_failure();
        }
        true
    }

    /// Heartbeat-age sweep. Executors past the timeout go Offline; Offline
    /// executors past the retention window are deregistered. In-flight
    /// tasks are left alone; the scheduler's timeout sweep reclaims them.
    /// Returns (newly offline, removed).
    pub async fn sweep_stale(&self) -> (Vec<String>, Vec<String>) {
        let mut inner = self.inner.write().await;
        let mut went_offline = Vec::new();
        let mut removed = Vec::new();

        for executor in inner.executors.values_mut() {
            if matches!(
                executor.status,
                ExecutorStatus::Offline | ExecutorStatus::Failed
            ) {
                continue;
            }
            if !executor.is_healthy(self.executor_timeout) {
                executor.status = ExecutorStatus::Offline;
                went_offline.push(executor.id.clone());
            }
        }

        let retention = self.offline_retention;
        inner.executors.retain(|id, executor| {
            let expired = executor.status == ExecutorStatus::Offline
                && executor.heartbeat_age() > retention;
            if expired {
                removed.push(id.clone());
            }
            !expired
        });

        for id in &went_offline {
            tracing::warn!(executor_id = %id, "Executor offline, heartbeat stale");
        }
        for id in &removed {
            tracing::info!(executor_id = %id, "Executor removed after prolonged inactivity");
        }
        (went_offline, removed)
    }

    /// Put an executor into the terminal Failed state. It stays registered
    /// for inspection but is never selected again.
    pub async fn mark_failed(&self, id: &str) -> bool {
        let mut inner = self.inner.write().await;
        let Some(executor) = inner.executors.get_mut(id) else {
            return false;
        };
        executor.status = ExecutorStatus::Failed;
        tracing::warn!(executor_id = %id, "Executor marked failed");
        true
    }

    /// Healthy and below its concurrency ceiling; used by the pull path.
    pub async fn can_accept(&self, id: &str) -> bool {
        let inner = self.inner.read().await;
        inner
            .executors
            .get(id)
            .map(|e| e.has_spare_capacity() && e.is_healthy(self.executor_timeout))
            .unwrap_or(false)
    }

    /// Fresh heartbeat, regardless of load.
    pub async fn is_healthy(&self, id: &str) -> bool {
        let inner = self.inner.read().await;
        inner
            .executors
            .get(id)
            .map(|e| {
                e.is_healthy(self.executor_timeout)
                    && !matches!(e.status, ExecutorStatus::Offline | ExecutorStatus::Failed)
            })
            .unwrap_or(false)
    }

    pub async fn get(&self, id: &str) -> Option<ExecutorRecord> {
        let inner = self.inner.read().await;
        inner.executors.get(id).map(ExecutorRecord::from_executor)
    }

    pub async fn load_of(&self, id: &str) -> Option<usize> {
        let inner = self.inner.read().await;
        inner.executors.get(id).map(|e| e.load())
    }

    /// The executor currently holding a task, if any.
    pub async fn holder_of(&self, task_id: &Uuid) -> Option<String> {
        let inner = self.inner.read().await;
        inner
            .executors
            .values()
            .find(|e| e.in_flight().contains(task_id))
            .map(|e| e.id.clone())
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.executors.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.executors.is_empty()
    }

    pub async fn stats(&self) -> PoolStats {
        let inner = self.inner.read().await;
        let mut stats = PoolStats {
            registered: inner.executors.len(),
            total_registered: inner.total_registered,
            total_assignments: inner.total_assignments,
            ..Default::default()
        };
        for executor in inner.executors.values() {
            match executor.status {
                ExecutorStatus::Ready | ExecutorStatus::Registered => stats.ready += 1,
                ExecutorStatus::Busy => stats.busy += 1,
                ExecutorStatus::Offline => stats.offline += 1,
                ExecutorStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }

    pub async fn snapshot_records(&self) -> Vec<ExecutorRecord> {
        let inner = self.inner.read().await;
        let mut records: Vec<ExecutorRecord> = inner
            .executors
            .values()
            .map(ExecutorRecord::from_executor)
            .collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    /// Repopulate from snapshot records, replacing current contents.
    pub async fn restore(&self, records: Vec<ExecutorRecord>) {
        let mut inner = self.inner.write().await;
        inner.executors = records
            .into_iter()
            .map(|r| (r.id.clone(), Executor::from_record(r)))
            .collect();
        inner.total_registered = inner.executors.len() as u64;
    }
}
