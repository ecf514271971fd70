use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    MapPhase,
    MapCompleted,
    ReducePhase,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::MapPhase => write!(f, "map_phase"),
            JobStatus::MapCompleted => write!(f, "map_completed"),
            JobStatus::ReducePhase => write!(f, "reduce_phase"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Client-facing description of a job to run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    pub client_id: String,
    pub input_refs: Vec<String>,
    pub num_reducers: u32,
    pub map_function: String,
    pub reduce_function: String,
}

impl JobSpec {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            input_refs: Vec::new(),
            num_reducers: 1,
            map_function: String::new(),
            reduce_function: String::new(),
        }
    }

    pub fn with_input(mut self, input_ref: impl Into<String>) -> Self {
        self.input_refs.push(input_ref.into());
        self
    }

    pub fn with_functions(
        mut self,
        map_function: impl Into<String>,
        reduce_function: impl Into<String>,
    ) -> Self {
        self.map_function = map_function.into();
        self.reduce_function = reduce_function.into();
        self
    }

    pub fn with_reducers(mut self, num_reducers: u32) -> Self {
        self.num_reducers = num_reducers.max(1);
        self
    }
}

/// A client job and its two-phase task graph.
///
/// The orchestrator owns the whole record. Task statuses live in the
/// scheduler's task table; the job only keeps the ids of its tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub client_id: String,
    pub status: JobStatus,
    pub input_refs: Vec<String>,
    pub num_reducers: u32,
    pub map_function: String,
    pub reduce_function: String,
    pub map_tasks: Vec<Uuid>,
    pub reduce_tasks: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
}

impl Job {
    pub fn from_spec(spec: JobSpec) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_id: spec.client_id,
            status: JobStatus::Pending,
            input_refs: spec.input_refs,
            num_reducers: spec.num_reducers.max(1),
            map_function: spec.map_function,
            reduce_function: spec.reduce_function,
            map_tasks: Vec::new(),
            reduce_tasks: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            failure_reason: None,
        }
    }

    pub(crate) fn start_map_phase(&mut self, map_tasks: Vec<Uuid>) {
        self.status = JobStatus::MapPhase;
        self.started_at = Some(Utc::now());
        self.map_tasks = map_tasks;
    }

    pub(crate) fn start_reduce_phase(&mut self, reduce_tasks: Vec<Uuid>) {
        self.status = JobStatus::ReducePhase;
        self.reduce_tasks = reduce_tasks;
    }

    pub(crate) fn complete(&mut self) {
        self.status = JobStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    pub(crate) fn fail(&mut self, reason: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.failure_reason = Some(reason.into());
        self.completed_at = Some(Utc::now());
    }

    pub(crate) fn cancel(&mut self, reason: impl Into<String>) {
        self.status = JobStatus::Cancelled;
        self.failure_reason = Some(reason.into());
        self.completed_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_builder() {
        let spec = JobSpec::new("client-1")
            .with_input("logs/day1.txt")
            .with_input("logs/day2.txt")
            .with_functions("wc_map", "wc_reduce")
            .with_reducers(4);
        assert_eq!(spec.input_refs.len(), 2);
        assert_eq!(spec.num_reducers, 4);
    }

    #[test]
    fn job_lifecycle_timestamps() {
        let mut job = Job::from_spec(JobSpec::new("c").with_input("in"));
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.started_at.is_none());

        job.start_map_phase(vec![Uuid::new_v4()]);
        assert_eq!(job.status, JobStatus::MapPhase);
        assert!(job.started_at.is_some());
        assert!(!job.status.is_terminal());

        job.complete();
        assert!(job.status.is_terminal());
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn zero_reducers_bumped_to_one() {
        let job = Job::from_spec(JobSpec::new("c").with_input("in").with_reducers(0));
        assert_eq!(job.num_reducers, 1);
    }
}
