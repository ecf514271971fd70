//! Task scheduler: pending-task queues, the periodic matching pass, and
//! timeout-driven recovery of lost tasks.

pub mod queue;
pub mod scheduler;
pub mod task;

pub use queue::TaskQueue;
pub use scheduler::{PhaseCounts, SchedulerStats, TaskScheduler};
pub use task::{Task, TaskStatus, TaskType};
