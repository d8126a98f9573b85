// src/engine/core.rs

//! Synchronous pipeline control logic.
//!
//! [`CoreRuntime`] owns the scheduler and turns each [`RuntimeEvent`] into a
//! [`CoreStep`]: jobs to hand to the runner, a cancel request, or the end of
//! the run. It never touches channels, timers or processes; that is the job
//! of [`super::runtime::Runtime`].

use crate::dag::Scheduler;
use crate::engine::event_handlers::{
    handle_grace_expired, handle_job_completion, handle_shutdown, handle_tick, CoreStep,
};
use crate::engine::{RuntimeEvent, RuntimeOptions};
use crate::report::PipelineReport;

/// Scheduler plus the concurrency bound of one pipeline run.
#[derive(Debug)]
pub struct CoreRuntime {
    scheduler: Scheduler,
    options: RuntimeOptions,
}

impl CoreRuntime {
    pub fn new(scheduler: Scheduler, options: RuntimeOptions) -> Self {
        let options = RuntimeOptions {
            concurrency: options.concurrency.max(1),
            ..options
        };
        Self { scheduler, options }
    }

    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Whether a shutdown has been requested.
    pub fn is_cancelling(&self) -> bool {
        self.scheduler.is_cancelled()
    }

    /// First scheduling pass of the run.
    pub fn start(&mut self) -> CoreStep {
        handle_tick(&mut self.scheduler, &self.options)
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        match event {
            RuntimeEvent::Tick => handle_tick(&mut self.scheduler, &self.options),
            RuntimeEvent::JobCompleted { job, exit_code } => {
                handle_job_completion(&mut self.scheduler, &self.options, job, exit_code)
            }
            RuntimeEvent::ShutdownRequested => handle_shutdown(&mut self.scheduler),
            RuntimeEvent::GraceExpired => handle_grace_expired(&mut self.scheduler),
        }
    }

    pub fn report(&self) -> PipelineReport {
        self.scheduler.report()
    }

    pub fn into_report(self) -> PipelineReport {
        self.scheduler.report()
    }
}
