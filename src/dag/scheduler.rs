// src/dag/scheduler.rs

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::config::job::{JobSpec, ResolvedPipeline};
use crate::dag::graph::DependencyGraph;
use crate::dag::job_info::{JobStatus, RuntimeJob, ScheduledJob, SkipReason};
use crate::dag::scheduler_step::SchedulerStep;
use crate::dag::state_manager::StateManager;
use crate::engine::JobName;
use crate::errors::Result;
use crate::report::{JobReport, PipelineReport};
use crate::types::When;

/// Inputs of one pipeline run.
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub pipeline_iid: u64,
    /// Id of the first job; the others follow in declaration order.
    pub first_job_id: u64,
    /// Manual jobs selected for this run, by job name or base name.
    pub manual_jobs: Vec<String>,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            pipeline_iid: 1,
            first_job_id: 1,
            manual_jobs: Vec::new(),
        }
    }
}

/// Scheduler holds the immutable graph plus the state of one run.
///
/// It is responsible for:
/// - skipping `never` jobs and unselected `manual` jobs up front
/// - deciding which jobs may start (wait-set terminal, `when` satisfied,
///   no failed earlier stage for `on_success` jobs)
/// - skipping jobs whose condition can no longer hold
/// - mapping exit codes to `Success` / `Warned` / `Failed`
/// - cancellation
#[derive(Debug)]
pub struct Scheduler {
    graph: DependencyGraph,
    specs: IndexMap<JobName, Arc<JobSpec>>,
    jobs: IndexMap<JobName, RuntimeJob>,
    /// Dispatch priority: stage index, then declaration order.
    order: Vec<JobName>,
    pipeline_iid: u64,
    started: bool,
    cancelled: bool,
}

impl Scheduler {
    /// Build the graph for `pipeline` and create a scheduler over it.
    pub fn from_pipeline(pipeline: &ResolvedPipeline, options: SchedulerOptions) -> Result<Self> {
        let graph = DependencyGraph::build(pipeline)?;
        Ok(Self::new(pipeline, graph, options))
    }

    pub fn new(pipeline: &ResolvedPipeline, graph: DependencyGraph, options: SchedulerOptions) -> Self {
        for selected in &options.manual_jobs {
            let known = pipeline
                .jobs
                .values()
                .any(|job| job.name == *selected || job.base_name == *selected);
            if !known {
                warn!(job = %selected, "selected manual job does not exist");
            }
        }

        let mut specs = IndexMap::new();
        let mut jobs = IndexMap::new();

        for (order, spec) in pipeline.jobs.values().enumerate() {
            let stage_index = graph
                .stage_index(&spec.name)
                .or_else(|| pipeline.stage_index(&spec.stage))
                .unwrap_or(0);
            let job_id = options.first_job_id + order as u64;
            let mut job = RuntimeJob::new(job_id, spec, stage_index, order);

            if job.when == When::Manual && is_selected(spec, &options.manual_jobs) {
                debug!(job = %spec.name, "manual job selected; runs as on_success");
                job.when = When::OnSuccess;
            }

            specs.insert(spec.name.clone(), Arc::new(spec.clone()));
            jobs.insert(spec.name.clone(), job);
        }

        let mut order: Vec<JobName> = jobs.keys().cloned().collect();
        order.sort_by_key(|name| {
            jobs.get(name)
                .map(|j| (j.stage_index, j.order))
                .unwrap_or((usize::MAX, usize::MAX))
        });

        Self {
            graph,
            specs,
            jobs,
            order,
            pipeline_iid: options.pipeline_iid,
            started: false,
            cancelled: false,
        }
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn status_of(&self, job: &str) -> Option<JobStatus> {
        self.jobs.get(job).map(|j| j.status)
    }

    pub fn skip_reason_of(&self, job: &str) -> Option<SkipReason> {
        self.jobs.get(job).and_then(|j| j.skip_reason)
    }

    pub fn job(&self, job: &str) -> Option<&RuntimeJob> {
        self.jobs.get(job)
    }

    pub fn running_count(&self) -> usize {
        self.jobs
            .values()
            .filter(|j| j.status == JobStatus::Running)
            .count()
    }

    /// Every job is terminal.
    pub fn is_finished(&self) -> bool {
        self.jobs.values().all(|j| j.status.is_terminal())
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// The run failed: a job failed (allowed failures excluded) or the run
    /// was cancelled.
    pub fn run_failed(&self) -> bool {
        self.cancelled || self.jobs.values().any(|j| j.status == JobStatus::Failed)
    }

    /// Skip the jobs that can never run in this pipeline.
    fn start(&mut self) -> Vec<JobName> {
        self.started = true;
        let mut skipped = Vec::new();
        for job in self.jobs.values_mut() {
            let reason = match job.when {
                When::Never => SkipReason::Never,
                When::Manual => SkipReason::ManualNotSelected,
                _ => continue,
            };
            debug!(job = %job.name, %reason, "skipping job at run start");
            job.skip(reason);
            skipped.push(job.name.clone());
        }
        info!(
            pipeline_iid = self.pipeline_iid,
            jobs = self.jobs.len(),
            skipped = skipped.len(),
            "pipeline run started"
        );
        skipped
    }

    /// One scheduling pass: apply skips and dispatch at most `limit` jobs.
    pub fn step_dispatch(&mut self, limit: usize) -> SchedulerStep {
        let mut newly_skipped = Vec::new();
        if !self.started {
            newly_skipped.extend(self.start());
        }

        if self.cancelled {
            return SchedulerStep {
                newly_scheduled: Vec::new(),
                newly_skipped,
                run_finished: self.is_finished(),
            };
        }

        let (ready, skipped) = {
            let mut manager = StateManager::new(&self.graph, &mut self.jobs, &self.order);
            manager.collect_candidates(limit)
        };
        newly_skipped.extend(skipped);

        let mut newly_scheduled = Vec::with_capacity(ready.len());
        for name in ready {
            if let Some(scheduled) = self.mark_running(&name) {
                newly_scheduled.push(scheduled);
            }
        }

        SchedulerStep {
            newly_scheduled,
            newly_skipped,
            run_finished: self.is_finished(),
        }
    }

    fn mark_running(&mut self, name: &str) -> Option<ScheduledJob> {
        let job = self.jobs.get_mut(name)?;
        let spec = self.specs.get(name)?.clone();

        job.status = JobStatus::Running;
        info!(
            job = %name,
            job_id = job.job_id,
            stage = %spec.stage,
            "dispatching job"
        );

        let mut variables = spec.env.clone();
        variables.insert("CI_JOB_ID".to_string(), job.job_id.to_string());
        variables.insert("CI_PIPELINE_IID".to_string(), self.pipeline_iid.to_string());

        Some(ScheduledJob {
            job_id: job.job_id,
            name: job.name.clone(),
            pipeline_iid: self.pipeline_iid,
            producers: self.graph.producers(name).to_vec(),
            spec,
            variables,
        })
    }

    /// Record the exit code of a running job.
    ///
    /// Returns the new status, or `None` when the job is unknown or was not
    /// running (late completions after an abandon are ignored).
    pub fn handle_completion(&mut self, name: &str, exit_code: i32) -> Option<JobStatus> {
        let Some(job) = self.jobs.get_mut(name) else {
            warn!(job = %name, "completion for unknown job; ignoring");
            return None;
        };

        if job.status != JobStatus::Running {
            warn!(job = %name, status = %job.status, "completion for a job that is not running; ignoring");
            return None;
        }

        job.exit_code = Some(exit_code);
        job.status = if exit_code == 0 {
            JobStatus::Success
        } else if job.allow_failure.permits(exit_code) {
            JobStatus::Warned
        } else {
            JobStatus::Failed
        };

        match job.status {
            JobStatus::Failed => warn!(job = %name, exit_code, "job failed"),
            JobStatus::Warned => warn!(job = %name, exit_code, "job failed (allowed to fail)"),
            _ => info!(job = %name, "job succeeded"),
        }

        Some(job.status)
    }

    /// Cancel the run: nothing more is dispatched and every job that has
    /// not started is skipped. Running jobs keep running until they
    /// complete or are abandoned.
    pub fn cancel(&mut self) -> Vec<JobName> {
        if !self.started {
            self.start();
        }
        self.cancelled = true;
        let mut manager = StateManager::new(&self.graph, &mut self.jobs, &self.order);
        let skipped = manager.skip_not_started(SkipReason::Cancelled);
        info!(skipped = skipped.len(), "pipeline cancelled");
        skipped
    }

    /// Mark every still running job as failed (grace period expired).
    pub fn abandon_running(&mut self) -> Vec<JobName> {
        let mut abandoned = Vec::new();
        for job in self.jobs.values_mut() {
            if job.status == JobStatus::Running {
                warn!(job = %job.name, "job did not stop in time; marking failed");
                job.status = JobStatus::Failed;
                abandoned.push(job.name.clone());
            }
        }
        abandoned
    }

    /// Snapshot of the run, in declaration order.
    pub fn report(&self) -> PipelineReport {
        let jobs = self
            .jobs
            .values()
            .filter_map(|job| {
                let spec = self.specs.get(&job.name)?;
                Some(JobReport {
                    job_id: job.job_id,
                    name: job.name.clone(),
                    stage: spec.stage.clone(),
                    status: job.status,
                    skip_reason: job.skip_reason,
                    allow_failure: spec.allow_failure.is_allowed(),
                    exit_code: job.exit_code,
                    environment: spec.environment.as_ref().and_then(|e| e.name.clone()),
                })
            })
            .collect();

        PipelineReport {
            pipeline_iid: self.pipeline_iid,
            succeeded: !self.run_failed(),
            cancelled: self.cancelled,
            jobs,
        }
    }
}

fn is_selected(spec: &JobSpec, selected: &[String]) -> bool {
    selected
        .iter()
        .any(|s| *s == spec.name || *s == spec.base_name)
}
