// src/engine/runtime.rs

use std::fmt;

use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::dag::ScheduledJob;
use crate::errors::Result;
use crate::exec::JobRunner;
use crate::report::PipelineReport;

use super::core::CoreRuntime;
use super::{CoreCommand, CoreStep, RuntimeEvent};

/// Drives the scheduler in response to `RuntimeEvent`s and delegates job
/// execution to a `JobRunner`.
///
/// This is a pure IO shell around `CoreRuntime`, which contains all the
/// runtime semantics. It waits on the event channel *or* the poll interval
/// (the latter bounds how long a pass can be delayed), and after a shutdown
/// request also on the grace deadline.
pub struct Runtime<R: JobRunner> {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    runner: R,
}

impl<R: JobRunner> fmt::Debug for Runtime<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl<R: JobRunner> Runtime<R> {
    pub fn new(core: CoreRuntime, event_rx: mpsc::Receiver<RuntimeEvent>, runner: R) -> Self {
        Self {
            core,
            event_rx,
            runner,
        }
    }

    /// Main event loop; returns the report once every job is terminal.
    pub async fn run(mut self) -> Result<PipelineReport> {
        info!("localci runtime started");

        let options = *self.core.options();
        let mut ticker = time::interval(options.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        let mut grace_deadline: Option<Instant> = None;

        let first = self.core.start();
        let mut keep_running = self.execute_step(first).await?;

        while keep_running {
            let event = tokio::select! {
                received = self.event_rx.recv() => match received {
                    Some(event) => event,
                    None => {
                        warn!("runtime event channel closed; abandoning running jobs");
                        self.core.step(RuntimeEvent::ShutdownRequested);
                        self.core.step(RuntimeEvent::GraceExpired);
                        break;
                    }
                },
                _ = ticker.tick() => RuntimeEvent::Tick,
                _ = grace_elapsed(grace_deadline) => RuntimeEvent::GraceExpired,
            };

            if !matches!(event, RuntimeEvent::Tick) {
                debug!(?event, "runtime received event");
            }

            let was_cancelling = self.core.is_cancelling();
            let step = self.core.step(event);
            if !was_cancelling && self.core.is_cancelling() {
                grace_deadline = Some(Instant::now() + options.shutdown_grace);
            }

            keep_running = self.execute_step(step).await?;
        }

        info!("runtime exiting");
        Ok(self.core.into_report())
    }

    /// Execute the commands of one core step; returns `keep_running`.
    async fn execute_step(&mut self, step: CoreStep) -> Result<bool> {
        for command in step.commands {
            self.execute_command(command).await?;
        }
        Ok(step.keep_running)
    }

    async fn execute_command(&mut self, command: CoreCommand) -> Result<()> {
        match command {
            CoreCommand::DispatchJobs(jobs) => self.start_jobs(jobs).await?,
            CoreCommand::CancelRunning => {
                info!("asking the runner to stop running jobs");
                self.runner.cancel_running().await?;
            }
            CoreCommand::Finished => info!("all jobs are terminal"),
        }
        Ok(())
    }

    async fn start_jobs(&mut self, jobs: Vec<ScheduledJob>) -> Result<()> {
        if jobs.is_empty() {
            return Ok(());
        }

        let names: Vec<_> = jobs.iter().map(|j| j.name.as_str()).collect();
        debug!(?names, "starting jobs");

        self.runner.start_jobs(jobs).await?;
        Ok(())
    }
}

async fn grace_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}
