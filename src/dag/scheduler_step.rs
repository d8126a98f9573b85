// src/dag/scheduler_step.rs

//! Step-by-step result type for the scheduler.

use crate::dag::job_info::ScheduledJob;
use crate::engine::JobName;

/// Structured result of a single scheduling pass.
///
/// Tests use it to step the pipeline manually and assert on what changed.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Jobs dispatched by this pass (now `Running`).
    pub newly_scheduled: Vec<ScheduledJob>,
    /// Jobs that became `Skipped` during this pass.
    pub newly_skipped: Vec<JobName>,
    /// Every job is terminal.
    pub run_finished: bool,
}
