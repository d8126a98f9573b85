// tests/integration/runtime.rs

use std::error::Error;

use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

use localci::dag::{JobStatus, Scheduler, SchedulerOptions, SkipReason};
use localci::engine::{CoreRuntime, Runtime, RuntimeEvent, RuntimeOptions};
use localci::report::PipelineReport;
use localci_test_utils::fake_runner::{FakeRunner, RunLog};
use localci_test_utils::{init_tracing, resolve_yaml};

type TestResult = Result<(), Box<dyn Error>>;

const PIPELINE: &str = r#"
stages: [build, test, deploy]
compile:
  stage: build
  script: [make]
unit:
  stage: test
  script: [test]
lint:
  stage: test
  script: [lint]
e2e:
  stage: test
  script: [e2e]
ship:
  stage: deploy
  script: [ship]
"#;

fn options(concurrency: usize) -> RuntimeOptions {
    RuntimeOptions {
        concurrency,
        poll_interval: Duration::from_millis(20),
        shutdown_grace: Duration::from_millis(500),
    }
}

/// Run `yaml` through the real runtime loop with the runner built by
/// `make_runner`.
async fn run_pipeline(
    yaml: &str,
    runtime_options: RuntimeOptions,
    make_runner: impl FnOnce(mpsc::Sender<RuntimeEvent>) -> FakeRunner,
) -> Result<(PipelineReport, RunLog), Box<dyn Error>> {
    init_tracing();

    let pipeline = resolve_yaml(yaml)?;
    let scheduler = Scheduler::from_pipeline(&pipeline, SchedulerOptions::default())?;

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(16);
    let runner = make_runner(rt_tx);
    let log = runner.log();

    let core = CoreRuntime::new(scheduler, runtime_options);
    let runtime = Runtime::new(core, rt_rx, runner);

    let report = match timeout(Duration::from_secs(3), runtime.run()).await {
        Ok(result) => result?,
        Err(_) => panic!("runtime did not finish within 3 seconds"),
    };

    let log = log.lock().unwrap().clone();
    Ok((report, log))
}

#[tokio::test]
async fn runtime_runs_stages_in_order_within_the_concurrency_bound() -> TestResult {
    let (report, log) = run_pipeline(PIPELINE, options(2), FakeRunner::new).await?;

    assert_eq!(log.started, vec!["compile", "unit", "lint", "e2e", "ship"]);
    assert!(log.max_in_flight <= 2, "max in flight was {}", log.max_in_flight);
    assert_eq!(log.max_in_flight, 2);

    assert!(report.succeeded);
    assert!(!report.cancelled);
    assert_eq!(report.count(JobStatus::Success), 5);
    Ok(())
}

#[tokio::test]
async fn concurrency_of_one_runs_jobs_strictly_one_at_a_time() -> TestResult {
    let (report, log) = run_pipeline(PIPELINE, options(1), FakeRunner::new).await?;

    assert_eq!(log.max_in_flight, 1);
    assert_eq!(log.started, log.completed);
    assert!(report.succeeded);
    Ok(())
}

#[tokio::test]
async fn failing_job_stops_later_stages_and_fails_the_run() -> TestResult {
    let (report, log) = run_pipeline(PIPELINE, options(4), |tx| {
        FakeRunner::new(tx).exit_code("compile", 2)
    })
    .await?;

    assert_eq!(log.started, vec!["compile"]);
    assert_eq!(report.status_of("compile"), Some(JobStatus::Failed));
    assert_eq!(report.job("compile").and_then(|j| j.exit_code), Some(2));
    for name in ["unit", "lint", "e2e", "ship"] {
        let job = report.job(name).ok_or("missing job")?;
        assert_eq!(job.status, JobStatus::Skipped);
        assert_eq!(job.skip_reason, Some(SkipReason::StageFailed));
    }
    assert!(!report.succeeded);
    Ok(())
}

#[tokio::test]
async fn allowed_failure_is_reported_as_warning() -> TestResult {
    let yaml = r#"
flaky:
  stage: build
  allow_failure: true
  script: [x]
after:
  stage: test
  script: [y]
"#;
    let (report, log) = run_pipeline(yaml, options(4), |tx| {
        FakeRunner::new(tx).exit_code("flaky", 1)
    })
    .await?;

    assert_eq!(log.started, vec!["flaky", "after"]);
    assert_eq!(report.status_of("flaky"), Some(JobStatus::Warned));
    assert_eq!(report.status_of("after"), Some(JobStatus::Success));
    assert!(report.succeeded);
    Ok(())
}

#[tokio::test]
async fn jobs_receive_their_environment() -> TestResult {
    let yaml = r#"
variables:
  TARGET: staging
deploy:
  script: ["deploy $TARGET"]
"#;
    let (_, log) = run_pipeline(yaml, options(2), FakeRunner::new).await?;

    let env = log.variables.get("deploy").ok_or("deploy never started")?;
    assert_eq!(env["TARGET"], "staging");
    assert_eq!(env["CI_JOB_NAME"], "deploy");
    assert_eq!(env["CI_JOB_ID"], "1");
    assert_eq!(env["CI_PIPELINE_IID"], "1");
    Ok(())
}

#[tokio::test]
async fn pipeline_with_only_skipped_jobs_finishes_immediately() -> TestResult {
    let yaml = r#"
off:
  when: never
  script: [x]
button:
  when: manual
  script: [y]
"#;
    let (report, log) = run_pipeline(yaml, options(2), FakeRunner::new).await?;

    assert!(log.started.is_empty());
    assert_eq!(report.count(JobStatus::Skipped), 2);
    assert!(report.succeeded);
    Ok(())
}
