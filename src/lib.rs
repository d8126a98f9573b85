// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod report;
pub mod rules;
pub mod types;
pub mod variables;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::settings::SettingsFile;
use crate::config::{load_pipeline, load_settings, FsIncludeFetcher, ResolveOptions};
use crate::dag::{Scheduler, SchedulerOptions};
use crate::engine::{CoreRuntime, Runtime, RuntimeEvent, RuntimeOptions};
use crate::exec::ShellJobRunner;
use crate::fs::RealFileSystem;
use crate::report::{print_job_list, print_report};
use crate::variables::{Environment, StaticVariableSource};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - settings and variable layers
/// - pipeline loading and resolution
/// - graph / scheduler / runtime
/// - the shell job runner
/// - Ctrl-C handling
///
/// Returns whether the pipeline passed.
pub async fn run(args: CliArgs) -> Result<bool> {
    let project_dir = project_dir(args.cwd.as_deref())?;
    let settings = load_settings(project_dir.join(&args.settings))?;

    let concurrency = args.concurrency.unwrap_or(settings.settings.concurrency);
    if concurrency == 0 {
        bail!("--concurrency must be at least 1");
    }

    let source = StaticVariableSource::new(
        predefined_variables(&project_dir, args.pipeline_iid),
        cli_variables(&settings, &args.variables),
    );
    let options = ResolveOptions::from_source(&source).with_pipeline_iid(args.pipeline_iid);
    let fetcher = FsIncludeFetcher::new(Arc::new(RealFileSystem), &project_dir);

    let pipeline_path = project_dir.join(&args.file);
    let pipeline = load_pipeline(&pipeline_path, &fetcher, &options)
        .with_context(|| format!("loading {}", pipeline_path.display()))?;

    if args.list {
        print_job_list(&pipeline);
        return Ok(true);
    }

    if !pipeline.workflow.run {
        println!("workflow rules prevent this pipeline from running; nothing to do");
        return Ok(true);
    }

    let scheduler = Scheduler::from_pipeline(
        &pipeline,
        SchedulerOptions {
            pipeline_iid: args.pipeline_iid,
            first_job_id: args.first_job_id,
            manual_jobs: args.manual.clone(),
        },
    )?;

    // Runtime event channel.
    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);

    let runner = ShellJobRunner::new(rt_tx.clone(), &project_dir, settings.settings.shell.clone());

    // Ctrl-C → graceful shutdown.
    {
        let tx = rt_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
        });
    }

    let runtime_options = RuntimeOptions {
        concurrency,
        poll_interval: settings.settings.poll_interval(),
        shutdown_grace: settings.settings.shutdown_grace(),
    };
    info!(
        concurrency,
        jobs = pipeline.jobs.len(),
        pipeline_iid = args.pipeline_iid,
        "running pipeline"
    );

    let core = CoreRuntime::new(scheduler, runtime_options);
    let report = Runtime::new(core, rt_rx, runner).run().await?;

    print_report(&report);
    Ok(report.succeeded)
}

fn project_dir(cwd: Option<&str>) -> Result<PathBuf> {
    let dir = match cwd {
        Some(dir) => PathBuf::from(dir),
        None => std::env::current_dir().context("reading the current directory")?,
    };
    dir.canonicalize()
        .with_context(|| format!("project directory {} is not accessible", dir.display()))
}

/// Variables that describe the local run. They have the highest precedence.
pub fn predefined_variables(project_dir: &Path, pipeline_iid: u64) -> Environment {
    let mut env = Environment::new();
    env.insert("CI".to_string(), "true".to_string());
    env.insert("GITLAB_CI".to_string(), "false".to_string());
    env.insert(
        "CI_PROJECT_DIR".to_string(),
        project_dir.display().to_string(),
    );
    if let Some(name) = project_dir.file_name().and_then(|n| n.to_str()) {
        env.insert("CI_PROJECT_NAME".to_string(), name.to_string());
    }
    env.insert("CI_PIPELINE_IID".to_string(), pipeline_iid.to_string());
    debug!(?env, "predefined variables");
    env
}

/// Settings-file variables, overridden by `--variable` flags.
fn cli_variables(settings: &SettingsFile, flags: &[(String, String)]) -> Environment {
    let mut env: Environment = settings.variables.clone();
    for (key, value) in flags {
        env.insert(key.clone(), value.clone());
    }
    env
}
