// src/exec/backend.rs

//! Pluggable job runner abstraction.
//!
//! The runtime talks to a `JobRunner` instead of spawning processes itself.
//! This makes it easy to swap in a fake runner in tests while keeping the
//! production runner in [`ShellJobRunner`].
//!
//! - `ShellJobRunner` runs job scripts on the host shell, one Tokio task per
//!   job, and reports each exit code back as `RuntimeEvent::JobCompleted`.
//! - Tests can provide their own `JobRunner` that, for example, records
//!   which jobs were started and directly emits `JobCompleted` events.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::dag::ScheduledJob;
use crate::engine::{JobName, RuntimeEvent};
use crate::exec::job_runner::{run_job, ShellContext};

/// Trait abstracting how scheduled jobs are executed.
///
/// `start_jobs` must not wait for the jobs to finish; completions are sent
/// back through the runtime event channel.
pub trait JobRunner: Send {
    fn start_jobs(
        &mut self,
        jobs: Vec<ScheduledJob>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Ask every running job to stop. Each stopped job still reports a
    /// completion (exit code -1).
    fn cancel_running(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Internal handle for a running job.
struct ActiveJob {
    cancel: Option<oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<()>,
}

/// Runs `before_script` + `script` with `<shell> -c`, then `after_script`.
pub struct ShellJobRunner {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    context: Arc<ShellContext>,
    active: HashMap<JobName, ActiveJob>,
}

impl ShellJobRunner {
    pub fn new(
        runtime_tx: mpsc::Sender<RuntimeEvent>,
        project_dir: impl Into<PathBuf>,
        shell: impl Into<String>,
    ) -> Self {
        Self {
            runtime_tx,
            context: Arc::new(ShellContext {
                project_dir: project_dir.into(),
                shell: shell.into(),
            }),
            active: HashMap::new(),
        }
    }

    fn prune_finished(&mut self) {
        self.active.retain(|_, job| !job.handle.is_finished());
    }
}

impl JobRunner for ShellJobRunner {
    fn start_jobs(
        &mut self,
        jobs: Vec<ScheduledJob>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.prune_finished();

            for job in jobs {
                let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
                let name = job.name.clone();
                let context = Arc::clone(&self.context);
                let tx = self.runtime_tx.clone();

                let spawn_name = name.clone();
                let handle = tokio::spawn(async move {
                    run_job(job, context, tx, cancel_rx).await;
                    debug!(job = %spawn_name, "job runner future finished");
                });

                self.active.insert(
                    name,
                    ActiveJob {
                        cancel: Some(cancel_tx),
                        handle,
                    },
                );
            }
            Ok(())
        })
    }

    fn cancel_running(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            for (name, job) in self.active.iter_mut() {
                if job.handle.is_finished() {
                    continue;
                }
                if let Some(cancel) = job.cancel.take()
                    && cancel.send(()).is_err()
                {
                    debug!(job = %name, "job already finished while cancelling");
                }
            }
            Ok(())
        })
    }
}
