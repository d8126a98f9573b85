// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use tracing::{debug, info};

use crate::dag::{ScheduledJob, Scheduler};
use crate::engine::{JobName, RuntimeOptions};

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Hand these jobs to the runner.
    DispatchJobs(Vec<ScheduledJob>),
    /// Ask the runner to stop every running job.
    CancelRunning,
    /// Every job is terminal; the run is over.
    Finished,
}

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute, in order.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

/// Run one scheduling pass within the concurrency bound.
pub fn handle_tick(scheduler: &mut Scheduler, options: &RuntimeOptions) -> CoreStep {
    let mut commands = Vec::new();

    let limit = options.concurrency.saturating_sub(scheduler.running_count());
    let step = scheduler.step_dispatch(limit);

    if !step.newly_skipped.is_empty() {
        debug!(skipped = ?step.newly_skipped, "jobs skipped during scheduling pass");
    }
    if !step.newly_scheduled.is_empty() {
        commands.push(CoreCommand::DispatchJobs(step.newly_scheduled));
    }

    finish_if_done(scheduler, commands)
}

/// Record a completion, then run a scheduling pass.
pub fn handle_job_completion(
    scheduler: &mut Scheduler,
    options: &RuntimeOptions,
    job: JobName,
    exit_code: i32,
) -> CoreStep {
    scheduler.handle_completion(&job, exit_code);
    handle_tick(scheduler, options)
}

/// Cancel the run: skip everything not started and stop what is running.
pub fn handle_shutdown(scheduler: &mut Scheduler) -> CoreStep {
    let mut commands = Vec::new();

    if !scheduler.is_cancelled() {
        let skipped = scheduler.cancel();
        info!(
            skipped = skipped.len(),
            running = scheduler.running_count(),
            "shutdown requested; cancelling pipeline"
        );
        if scheduler.running_count() > 0 {
            commands.push(CoreCommand::CancelRunning);
        }
    }

    finish_if_done(scheduler, commands)
}

/// Give up on jobs that did not stop within the grace period.
pub fn handle_grace_expired(scheduler: &mut Scheduler) -> CoreStep {
    let abandoned = scheduler.abandon_running();
    if !abandoned.is_empty() {
        info!(?abandoned, "shutdown grace period expired");
    }
    finish_if_done(scheduler, Vec::new())
}

fn finish_if_done(scheduler: &Scheduler, mut commands: Vec<CoreCommand>) -> CoreStep {
    if scheduler.is_finished() {
        commands.push(CoreCommand::Finished);
        return CoreStep {
            commands,
            keep_running: false,
        };
    }

    CoreStep {
        commands,
        keep_running: true,
    }
}
