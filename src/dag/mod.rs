// src/dag/mod.rs

//! Dependency graph and scheduling.
//!
//! - [`graph`] holds the static wait-sets and producers of every job.
//! - [`scheduler`] contains the per-run state machine that decides which
//!   jobs start, which are skipped, and how exit codes map to statuses.
//! - [`job_info`] provides runtime job state and scheduled job types.
//! - [`scheduler_step`] defines the result type for scheduler steps.
//! - [`state_manager`] manages per-run state transitions.

pub mod graph;
pub mod job_info;
pub mod scheduler;
pub mod scheduler_step;
pub mod state_manager;

pub use graph::{DependencyGraph, NeedEdge, Producer};
pub use job_info::{JobStatus, RuntimeJob, ScheduledJob, SkipReason};
pub use scheduler::{Scheduler, SchedulerOptions};
pub use scheduler_step::SchedulerStep;
