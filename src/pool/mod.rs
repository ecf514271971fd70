//! Executor pool: the authoritative view of which executors exist, their
//! heartbeat-driven health, and their spare capacity.
//!
//! The pool answers one question for the scheduler ("which executor should
//! get the next task") and owns all executor mutation: registration,
//! heartbeats, task assignment accounting, and the staleness sweep.

pub mod executor;
pub mod registry;

pub use executor::{Capacity, Executor, ExecutorRecord, ExecutorStatus};
pub use registry::{ExecutorPool, PoolStats};
