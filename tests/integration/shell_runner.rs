// tests/integration/shell_runner.rs

use std::error::Error;

use tokio::sync::mpsc;

use localci::dag::{ScheduledJob, Scheduler, SchedulerOptions};
use localci::engine::RuntimeEvent;
use localci::exec::job_runner::{compose_script, ABORTED_EXIT_CODE};
use localci::exec::{JobRunner, ShellJobRunner};
use localci_test_utils::{init_tracing, resolve_yaml, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

/// Resolve a single-job pipeline and take the scheduled job.
fn scheduled(yaml: &str) -> Result<ScheduledJob, Box<dyn Error>> {
    let pipeline = resolve_yaml(yaml)?;
    let mut scheduler = Scheduler::from_pipeline(&pipeline, SchedulerOptions::default())?;
    let mut step = scheduler.step_dispatch(1);
    step.newly_scheduled.pop().ok_or_else(|| "nothing was scheduled".into())
}

async fn run_one(
    job: ScheduledJob,
    dir: &std::path::Path,
) -> Result<(String, i32), Box<dyn Error>> {
    let (tx, mut rx) = mpsc::channel::<RuntimeEvent>(4);
    let mut runner = ShellJobRunner::new(tx, dir, "sh");
    runner.start_jobs(vec![job]).await?;

    match with_timeout(rx.recv()).await {
        Some(RuntimeEvent::JobCompleted { job, exit_code }) => Ok((job, exit_code)),
        other => panic!("expected a completion, got {other:?}"),
    }
}

#[test]
fn composed_script_stops_at_the_first_failure() {
    let lines = vec!["echo one".to_string(), "echo two".to_string()];
    assert_eq!(compose_script(lines.iter()), "set -e\necho one\necho two\n");
}

#[tokio::test]
async fn exit_code_of_the_script_is_reported() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;

    let job = scheduled("fail:\n  script: [\"exit 3\"]\n")?;
    let (name, code) = run_one(job, dir.path()).await?;
    assert_eq!(name, "fail");
    assert_eq!(code, 3);
    Ok(())
}

#[tokio::test]
async fn job_runs_in_the_project_dir_with_its_variables() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;

    let job = scheduled(
        r#"
variables:
  TARGET: staging
write:
  before_script: ["test \"$CI_JOB_NAME\" = write"]
  script: ["echo \"$TARGET $CI_JOB_ID\" > out.txt"]
"#,
    )?;
    let (_, code) = run_one(job, dir.path()).await?;
    assert_eq!(code, 0);

    let written = std::fs::read_to_string(dir.path().join("out.txt"))?;
    assert_eq!(written.trim(), "staging 1");
    Ok(())
}

#[tokio::test]
async fn failing_line_stops_the_script_but_after_script_still_runs() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;

    let job = scheduled(
        r#"
job:
  script: ["false", "touch never.txt"]
  after_script: ["touch after.txt"]
"#,
    )?;
    let (_, code) = run_one(job, dir.path()).await?;

    assert_eq!(code, 1);
    assert!(!dir.path().join("never.txt").exists());
    assert!(dir.path().join("after.txt").exists());
    Ok(())
}

#[tokio::test]
async fn trigger_job_completes_without_running_anything() -> TestResult {
    let dir = tempfile::tempdir()?;
    let job = scheduled("downstream:\n  trigger: group/other\n")?;
    let (_, code) = run_one(job, dir.path()).await?;
    assert_eq!(code, 0);
    Ok(())
}

#[tokio::test]
async fn cancelled_job_is_killed_and_reports_aborted() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;

    let job = scheduled("slow:\n  script: [\"sleep 30\"]\n")?;
    let (tx, mut rx) = mpsc::channel::<RuntimeEvent>(4);
    let mut runner = ShellJobRunner::new(tx, dir.path(), "sh");
    runner.start_jobs(vec![job]).await?;

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    runner.cancel_running().await?;

    match with_timeout(rx.recv()).await {
        Some(RuntimeEvent::JobCompleted { job, exit_code }) => {
            assert_eq!(job, "slow");
            assert_eq!(exit_code, ABORTED_EXIT_CODE);
        }
        other => panic!("expected a completion, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn missing_shell_reports_aborted() -> TestResult {
    let dir = tempfile::tempdir()?;
    let job = scheduled("job:\n  script: [\"true\"]\n")?;

    let (tx, mut rx) = mpsc::channel::<RuntimeEvent>(4);
    let mut runner = ShellJobRunner::new(tx, dir.path(), "/nonexistent/shell");
    runner.start_jobs(vec![job]).await?;

    match with_timeout(rx.recv()).await {
        Some(RuntimeEvent::JobCompleted { exit_code, .. }) => {
            assert_eq!(exit_code, ABORTED_EXIT_CODE)
        }
        other => panic!("expected a completion, got {other:?}"),
    }
    Ok(())
}
