use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::orchestrator::Job;
use crate::pool::ExecutorRecord;
use crate::sched::Task;

pub const SNAPSHOT_VERSION: &str = "1.0";

/// Serializable view of the whole control plane for an external persistence
/// component. The persistor saves and restores this without understanding
/// any scheduling logic.
///
/// In-flight placement is deliberately not preserved: on restore, tasks that
/// were Assigned or Running come back Pending and re-queue, and executor
/// in-flight sets come back empty. At-least-once execution makes that safe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlSnapshot {
    pub version: String,
    pub taken_at: DateTime<Utc>,
    pub executors: Vec<ExecutorRecord>,
    pub jobs: Vec<Job>,
    pub tasks: Vec<Task>,
}

impl ControlSnapshot {
    pub fn new(executors: Vec<ExecutorRecord>, jobs: Vec<Job>, tasks: Vec<Task>) -> Self {
        Self {
            version: SNAPSHOT_VERSION.to_string(),
            taken_at: Utc::now(),
            executors,
            jobs,
            tasks,
        }
    }

    pub fn is_compatible(&self) -> bool {
        self.version == SNAPSHOT_VERSION
    }
}
