// src/exec/job_runner.rs

//! Individual job process runner.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::dag::ScheduledJob;
use crate::engine::RuntimeEvent;

/// Exit code reported for jobs that could not run or were killed.
pub const ABORTED_EXIT_CODE: i32 = -1;

/// Host settings shared by every job.
#[derive(Debug, Clone)]
pub struct ShellContext {
    /// Working directory (`CI_PROJECT_DIR`).
    pub project_dir: PathBuf,
    pub shell: String,
}

/// Run a single job and always emit exactly one `JobCompleted` event.
pub async fn run_job(
    job: ScheduledJob,
    context: Arc<ShellContext>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    cancel_rx: oneshot::Receiver<()>,
) {
    let name = job.name.clone();
    let exit_code = match run_job_inner(&job, &context, cancel_rx).await {
        Ok(code) => code,
        Err(err) => {
            error!(job = %name, error = %err, "job execution error");
            ABORTED_EXIT_CODE
        }
    };

    if runtime_tx
        .send(RuntimeEvent::JobCompleted {
            job: name.clone(),
            exit_code,
        })
        .await
        .is_err()
    {
        debug!(job = %name, "runtime gone; dropping completion");
    }
}

async fn run_job_inner(
    job: &ScheduledJob,
    context: &ShellContext,
    mut cancel_rx: oneshot::Receiver<()>,
) -> Result<i32> {
    let spec = &job.spec;

    if spec.script.is_empty() {
        info!(job = %job.name, "trigger job; nothing to run locally");
        return Ok(0);
    }

    info!(
        job = %job.name,
        job_id = job.job_id,
        stage = %spec.stage,
        "starting job"
    );

    let script = compose_script(spec.before_script.iter().chain(spec.script.iter()));

    let exit_code = tokio::select! {
        result = run_script(job, context, &script) => result?,
        Ok(()) = &mut cancel_rx => {
            info!(job = %job.name, "cancellation requested; killing job");
            // The child is killed on drop.
            return Ok(ABORTED_EXIT_CODE);
        }
    };

    if !spec.after_script.is_empty() {
        let after = compose_script(spec.after_script.iter());
        match run_script(job, context, &after).await {
            Ok(0) => {}
            Ok(code) => warn!(job = %job.name, exit_code = code, "after_script failed"),
            Err(err) => warn!(job = %job.name, error = %err, "after_script could not run"),
        }
    }

    info!(job = %job.name, exit_code, "job process exited");
    Ok(exit_code)
}

/// Join script lines into one shell program that stops at the first
/// failing command.
pub fn compose_script<'a>(lines: impl Iterator<Item = &'a String>) -> String {
    let mut script = String::from("set -e\n");
    for line in lines {
        script.push_str(line);
        script.push('\n');
    }
    script
}

async fn run_script(job: &ScheduledJob, context: &ShellContext, script: &str) -> Result<i32> {
    let mut cmd = Command::new(&context.shell);
    cmd.arg("-c")
        .arg(script)
        .current_dir(&context.project_dir)
        .envs(&job.variables)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning shell for job '{}'", job.name))?;

    let mut printers = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        printers.push(tokio::spawn(print_lines(job.name.clone(), stdout)));
    }
    if let Some(stderr) = child.stderr.take() {
        printers.push(tokio::spawn(print_lines(job.name.clone(), stderr)));
    }

    let status = child
        .wait()
        .await
        .with_context(|| format!("waiting for the shell of job '{}'", job.name))?;

    for printer in printers {
        let _ = printer.await;
    }

    Ok(status.code().unwrap_or(ABORTED_EXIT_CODE))
}

async fn print_lines<R: AsyncRead + Unpin>(job: String, stream: R) {
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        println!("[{job}] {line}");
    }
}
