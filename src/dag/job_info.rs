// src/dag/job_info.rs

//! Per-run job state and the job description handed to the runner.

use std::fmt;
use std::sync::Arc;

use crate::config::job::JobSpec;
use crate::config::model::AllowFailure;
use crate::dag::graph::Producer;
use crate::engine::JobName;
use crate::types::When;
use crate::variables::Environment;

/// Status of a job within one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    NotStarted,
    Running,
    Success,
    /// Failed, but the failure is allowed.
    Warned,
    Failed,
    Skipped,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Success | JobStatus::Warned | JobStatus::Failed | JobStatus::Skipped
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::NotStarted => "not started",
            JobStatus::Running => "running",
            JobStatus::Success => "success",
            JobStatus::Warned => "warned",
            JobStatus::Failed => "failed",
            JobStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a job was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// `when: never`, or no rule matched.
    Never,
    /// `when: manual` and not selected for this run.
    ManualNotSelected,
    /// `on_success` job with a failed upstream.
    UpstreamFailed,
    /// `on_failure` job without any failed upstream.
    NoUpstreamFailure,
    /// An earlier stage finished with a failed job.
    StageFailed,
    /// The run was cancelled before the job started.
    Cancelled,
}

impl SkipReason {
    /// Skips that stand for a failure further up. Downstream jobs treat
    /// them like a failed job.
    pub fn carries_failure(self) -> bool {
        matches!(
            self,
            SkipReason::UpstreamFailed | SkipReason::StageFailed | SkipReason::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::Never => "never",
            SkipReason::ManualNotSelected => "manual job not selected",
            SkipReason::UpstreamFailed => "upstream failed",
            SkipReason::NoUpstreamFailure => "no upstream failure",
            SkipReason::StageFailed => "earlier stage failed",
            SkipReason::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime state of one job (one parallel member).
#[derive(Debug, Clone)]
pub struct RuntimeJob {
    pub job_id: u64,
    pub name: JobName,
    pub stage_index: usize,
    /// Declaration order, used to break ties inside a stage.
    pub order: usize,
    /// Effective `when` (a selected manual job runs as `on_success`).
    pub when: When,
    pub allow_failure: AllowFailure,
    pub status: JobStatus,
    pub skip_reason: Option<SkipReason>,
    pub exit_code: Option<i32>,
}

impl RuntimeJob {
    pub fn new(job_id: u64, spec: &JobSpec, stage_index: usize, order: usize) -> Self {
        Self {
            job_id,
            name: spec.name.clone(),
            stage_index,
            order,
            when: spec.when,
            allow_failure: spec.allow_failure.clone(),
            status: JobStatus::NotStarted,
            skip_reason: None,
            exit_code: None,
        }
    }

    /// Failed, or skipped because of a failure.
    pub fn counts_as_failure(&self) -> bool {
        match self.status {
            JobStatus::Failed => true,
            JobStatus::Skipped => self.skip_reason.is_some_and(SkipReason::carries_failure),
            _ => false,
        }
    }

    pub fn skip(&mut self, reason: SkipReason) {
        self.status = JobStatus::Skipped;
        self.skip_reason = Some(reason);
    }
}

/// A job the scheduler wants the runner to start now.
#[derive(Debug, Clone)]
pub struct ScheduledJob {
    pub job_id: u64,
    pub name: JobName,
    pub pipeline_iid: u64,
    pub spec: Arc<JobSpec>,
    pub producers: Vec<Producer>,
    /// Fully layered environment, including `CI_JOB_ID`.
    pub variables: Environment,
}
