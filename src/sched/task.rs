use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskType {
    Map,
    Reduce,
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskType::Map => write!(f, "map"),
            TaskType::Reduce => write!(f, "reduce"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    Assigned,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Assigned => write!(f, "assigned"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// One unit of map or reduce work.
///
/// The scheduler writes the placement fields (status, assigned executor,
/// start/completion times, attempts); the orchestrator only creates tasks
/// and keeps their ids on the owning job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub job_id: Uuid,
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub assigned_executor: Option<String>,
    /// Reference to the input partition this task consumes.
    pub input_ref: String,
    /// Reference to the map or reduce function to run.
    pub function_ref: String,
    /// Higher is scheduled first within a queue.
    pub priority: i32,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub output: Option<String>,
    pub error: Option<String>,
}

impl Task {
    pub fn new(
        job_id: Uuid,
        task_type: TaskType,
        input_ref: impl Into<String>,
        function_ref: impl Into<String>,
        priority: i32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id,
            task_type,
            status: TaskStatus::Pending,
            assigned_executor: None,
            input_ref: input_ref.into(),
            function_ref: function_ref.into(),
            priority,
            attempts: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            output: None,
            error: None,
        }
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self.status, TaskStatus::Assigned | TaskStatus::Running)
    }

    pub(crate) fn mark_assigned(&mut self, executor_id: &str) {
        self.status = TaskStatus::Assigned;
        self.assigned_executor = Some(executor_id.to_string());
        self.attempts += 1;
    }

    pub(crate) fn mark_running(&mut self) {
        self.status = TaskStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub(crate) fn mark_pending(&mut self) {
        self.status = TaskStatus::Pending;
        self.assigned_executor = None;
        self.started_at = None;
    }

    pub(crate) fn mark_completed(&mut self, output: Option<String>) {
        self.status = TaskStatus::Completed;
        self.assigned_executor = None;
        self.output = output;
        self.completed_at = Some(Utc::now());
    }

    pub(crate) fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = TaskStatus::Failed;
        self.assigned_executor = None;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
    }

    pub(crate) fn mark_cancelled(&mut self) {
        self.status = TaskStatus::Cancelled;
        self.assigned_executor = None;
        self.completed_at = Some(Utc::now());
    }
}
