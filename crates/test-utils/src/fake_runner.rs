use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{mpsc, watch};
use tracing::debug;

use localci::dag::ScheduledJob;
use localci::engine::RuntimeEvent;
use localci::exec::JobRunner;
use localci::variables::Environment;

/// What the fake runner observed.
#[derive(Debug, Clone, Default)]
pub struct RunLog {
    /// Job names in start order.
    pub started: Vec<String>,
    /// Job names in completion order.
    pub completed: Vec<String>,
    /// Highest number of jobs in flight at once.
    pub max_in_flight: usize,
    pub cancel_requests: usize,
    /// Environment each job was started with.
    pub variables: HashMap<String, Environment>,
    in_flight: usize,
}

/// A fake runner that:
/// - records which jobs were started, and with which variables
/// - completes every job after `delay` with its scripted exit code (0 by
///   default)
/// - can hold jobs until they are cancelled, or ignore cancellation
///   entirely
/// - can request a shutdown as soon as a given job starts
pub struct FakeRunner {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    exit_codes: HashMap<String, i32>,
    hanging: HashSet<String>,
    stubborn: HashSet<String>,
    shutdown_on_start: Option<String>,
    delay: Duration,
    log: Arc<Mutex<RunLog>>,
    cancel_tx: watch::Sender<bool>,
}

impl FakeRunner {
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        let (cancel_tx, _) = watch::channel(false);
        Self {
            runtime_tx,
            exit_codes: HashMap::new(),
            hanging: HashSet::new(),
            stubborn: HashSet::new(),
            shutdown_on_start: None,
            delay: Duration::from_millis(5),
            log: Arc::new(Mutex::new(RunLog::default())),
            cancel_tx,
        }
    }

    pub fn exit_code(mut self, job: &str, code: i32) -> Self {
        self.exit_codes.insert(job.to_string(), code);
        self
    }

    /// The job only finishes when cancelled (exit code -1).
    pub fn hang(mut self, job: &str) -> Self {
        self.hanging.insert(job.to_string());
        self
    }

    /// The job never finishes, not even when cancelled.
    pub fn stubborn(mut self, job: &str) -> Self {
        self.stubborn.insert(job.to_string());
        self
    }

    pub fn shutdown_on_start(mut self, job: &str) -> Self {
        self.shutdown_on_start = Some(job.to_string());
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Shared handle on what the runner observed.
    pub fn log(&self) -> Arc<Mutex<RunLog>> {
        Arc::clone(&self.log)
    }
}

impl JobRunner for FakeRunner {
    fn start_jobs(
        &mut self,
        jobs: Vec<ScheduledJob>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            for job in jobs {
                let name = job.name.clone();
                {
                    let mut log = self.log.lock().unwrap();
                    log.started.push(name.clone());
                    log.variables.insert(name.clone(), job.variables.clone());
                    log.in_flight += 1;
                    log.max_in_flight = log.max_in_flight.max(log.in_flight);
                }
                debug!(job = %name, "fake runner starting job");

                if self.shutdown_on_start.as_deref() == Some(name.as_str()) {
                    self.runtime_tx.send(RuntimeEvent::ShutdownRequested).await?;
                }

                let exit_code = self.exit_codes.get(&name).copied().unwrap_or(0);
                let hanging = self.hanging.contains(&name);
                let stubborn = self.stubborn.contains(&name);
                let delay = self.delay;
                let tx = self.runtime_tx.clone();
                let log = Arc::clone(&self.log);
                let mut cancel_rx = self.cancel_tx.subscribe();

                tokio::spawn(async move {
                    let exit_code = if stubborn {
                        std::future::pending::<i32>().await
                    } else if hanging {
                        let _ = cancel_rx.wait_for(|cancelled| *cancelled).await;
                        -1
                    } else {
                        tokio::select! {
                            _ = tokio::time::sleep(delay) => exit_code,
                            _ = cancel_rx.wait_for(|cancelled| *cancelled) => -1,
                        }
                    };

                    {
                        let mut log = log.lock().unwrap();
                        log.in_flight -= 1;
                        log.completed.push(name.clone());
                    }
                    let _ = tx
                        .send(RuntimeEvent::JobCompleted {
                            job: name,
                            exit_code,
                        })
                        .await;
                });
            }
            Ok(())
        })
    }

    fn cancel_running(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.log.lock().unwrap().cancel_requests += 1;
            self.cancel_tx.send_replace(true);
            Ok(())
        })
    }
}
