// src/engine/mod.rs

//! Pipeline execution loop.
//!
//! [`core::CoreRuntime`] decides what happens next for every event (a tick,
//! a job completion, Ctrl-C, the end of the grace period) while
//! [`runtime::Runtime`] waits for those events and talks to the job runner.

use std::time::Duration;

/// Canonical job name type used throughout the engine.
pub type JobName = String;

/// Limits and timings of one run.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeOptions {
    /// Maximum number of jobs running at once (at least 1).
    pub concurrency: usize,
    /// Upper bound between two scheduling passes without any event.
    pub poll_interval: Duration,
    /// How long running jobs get after a shutdown request before they are
    /// marked failed.
    pub shutdown_grace: Duration,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            poll_interval: Duration::from_millis(250),
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

/// Events flowing into the runtime from the runner, timers and signals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeEvent {
    /// Periodic wake-up; runs a scheduling pass.
    Tick,
    /// A job finished with the given exit code (-1 when it could not be
    /// run or was killed).
    JobCompleted { job: JobName, exit_code: i32 },
    /// Ctrl-C: stop dispatching and cancel the run.
    ShutdownRequested,
    /// The shutdown grace period is over.
    GraceExpired,
}

pub mod core;
pub mod event_handlers;
pub mod runtime;

pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use runtime::Runtime;
