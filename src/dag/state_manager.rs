// src/dag/state_manager.rs

//! Per-run state transitions for jobs in the scheduler.

use indexmap::IndexMap;
use tracing::debug;

use crate::dag::graph::DependencyGraph;
use crate::dag::job_info::{JobStatus, RuntimeJob, SkipReason};
use crate::engine::JobName;
use crate::types::When;

/// What a not-started job should do on this scheduling pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Something it waits on is not terminal yet.
    Waiting,
    /// May be dispatched now.
    Ready,
    /// Will never run in this pipeline.
    Skip(SkipReason),
}

/// Manages per-run state transitions for jobs.
pub struct StateManager<'a> {
    graph: &'a DependencyGraph,
    jobs: &'a mut IndexMap<JobName, RuntimeJob>,
    /// Job names in dispatch priority (stage, then declaration order).
    order: &'a [JobName],
}

impl<'a> StateManager<'a> {
    pub fn new(
        graph: &'a DependencyGraph,
        jobs: &'a mut IndexMap<JobName, RuntimeJob>,
        order: &'a [JobName],
    ) -> Self {
        Self { graph, jobs, order }
    }

    /// Apply every skip that can be decided now, repeatedly, until nothing
    /// changes; then return up to `limit` dispatchable jobs in priority
    /// order together with the names of the jobs skipped on the way.
    pub fn collect_candidates(&mut self, limit: usize) -> (Vec<JobName>, Vec<JobName>) {
        let mut skipped = Vec::new();

        loop {
            let view = ReadOnlyStateManager::new(self.graph, self.jobs);
            let failed_stage = view.first_failed_stage();
            let mut ready = Vec::new();
            let mut to_skip = Vec::new();

            for name in self.order {
                let Some(job) = self.jobs.get(name) else {
                    continue;
                };
                match view.readiness(job, failed_stage) {
                    Readiness::Waiting => {}
                    Readiness::Ready => ready.push(name.clone()),
                    Readiness::Skip(reason) => to_skip.push((name.clone(), reason)),
                }
            }

            if to_skip.is_empty() {
                ready.truncate(limit);
                return (ready, skipped);
            }

            for (name, reason) in to_skip {
                if let Some(job) = self.jobs.get_mut(&name) {
                    debug!(job = %name, %reason, "skipping job");
                    job.skip(reason);
                    skipped.push(name);
                }
            }
        }
    }

    /// Skip every job that has not started yet.
    pub fn skip_not_started(&mut self, reason: SkipReason) -> Vec<JobName> {
        let mut skipped = Vec::new();
        for job in self.jobs.values_mut() {
            if job.status == JobStatus::NotStarted {
                job.skip(reason);
                skipped.push(job.name.clone());
            }
        }
        skipped
    }

    pub fn all_terminal(&self) -> bool {
        self.jobs.values().all(|job| job.status.is_terminal())
    }
}

/// Read-only view used to decide readiness.
pub struct ReadOnlyStateManager<'a> {
    graph: &'a DependencyGraph,
    jobs: &'a IndexMap<JobName, RuntimeJob>,
}

impl<'a> ReadOnlyStateManager<'a> {
    pub fn new(graph: &'a DependencyGraph, jobs: &'a IndexMap<JobName, RuntimeJob>) -> Self {
        Self { graph, jobs }
    }

    /// Lowest stage index whose jobs are all terminal and which contains a
    /// failed job.
    pub fn first_failed_stage(&self) -> Option<usize> {
        let mut failed: Option<usize> = None;
        for job in self.jobs.values() {
            if job.status == JobStatus::Failed {
                let idx = job.stage_index;
                if failed.is_none_or(|f| idx < f) && self.stage_finished(idx) {
                    failed = Some(idx);
                }
            }
        }
        failed
    }

    fn stage_finished(&self, stage_index: usize) -> bool {
        self.jobs
            .values()
            .filter(|job| job.stage_index == stage_index)
            .all(|job| job.status.is_terminal())
    }

    pub fn readiness(&self, job: &RuntimeJob, failed_stage: Option<usize>) -> Readiness {
        if job.status != JobStatus::NotStarted {
            return Readiness::Waiting;
        }

        match job.when {
            When::Never => return Readiness::Skip(SkipReason::Never),
            When::Manual => return Readiness::Skip(SkipReason::ManualNotSelected),
            _ => {}
        }

        let on_success = matches!(job.when, When::OnSuccess | When::Delayed);
        if on_success && failed_stage.is_some_and(|stage| stage < job.stage_index) {
            return Readiness::Skip(SkipReason::StageFailed);
        }

        let mut upstream_failed = false;
        for upstream in self.graph.wait_set(&job.name) {
            let Some(up) = self.jobs.get(upstream) else {
                continue;
            };
            if !up.status.is_terminal() {
                return Readiness::Waiting;
            }
            upstream_failed |= up.counts_as_failure();
        }

        match job.when {
            When::OnFailure if upstream_failed => Readiness::Ready,
            When::OnFailure => Readiness::Skip(SkipReason::NoUpstreamFailure),
            When::Always => Readiness::Ready,
            _ if upstream_failed => Readiness::Skip(SkipReason::UpstreamFailed),
            _ => Readiness::Ready,
        }
    }
}
