// tests/integration/report.rs

use std::error::Error;

use localci::dag::{JobStatus, SkipReason};
use localci::report::{write_job_list, write_report, JobReport, PipelineReport};
use localci_test_utils::fetcher::MapFetcher;
use localci_test_utils::{options_with_vars, resolve_yaml, resolve_yaml_with};

type TestResult = Result<(), Box<dyn Error>>;

fn job(name: &str, stage: &str, status: JobStatus) -> JobReport {
    JobReport {
        job_id: 1,
        name: name.to_string(),
        stage: stage.to_string(),
        status,
        skip_reason: None,
        allow_failure: false,
        exit_code: None,
        environment: None,
    }
}

#[test]
fn report_lists_every_job_and_a_verdict() -> TestResult {
    let report = PipelineReport {
        pipeline_iid: 12,
        succeeded: false,
        cancelled: false,
        jobs: vec![
            JobReport {
                exit_code: Some(0),
                environment: Some("production".into()),
                ..job("deploy", "deploy", JobStatus::Success)
            },
            JobReport {
                exit_code: Some(1),
                allow_failure: true,
                ..job("lint", "test", JobStatus::Warned)
            },
            JobReport {
                exit_code: Some(2),
                ..job("unit", "test", JobStatus::Failed)
            },
            JobReport {
                skip_reason: Some(SkipReason::UpstreamFailed),
                ..job("e2e", "test", JobStatus::Skipped)
            },
        ],
    };

    let mut out = Vec::new();
    write_report(&mut out, &report)?;
    let text = String::from_utf8(out)?;

    assert!(text.contains("pipeline #12"), "{text}");
    assert!(text.contains("exit 2"), "{text}");
    assert!(text.contains("(upstream failed)"), "{text}");
    assert!(text.contains("[allowed to fail]"), "{text}");
    assert!(text.contains("-> production"), "{text}");
    assert!(
        text.ends_with("failed: 1 succeeded, 1 warned, 1 failed, 1 skipped\n"),
        "{text}"
    );
    Ok(())
}

#[test]
fn verdict_reflects_success_and_cancellation() -> TestResult {
    let mut report = PipelineReport {
        pipeline_iid: 1,
        succeeded: true,
        cancelled: false,
        jobs: vec![job("only", "test", JobStatus::Success)],
    };

    let mut out = Vec::new();
    write_report(&mut out, &report)?;
    assert!(String::from_utf8(out)?.contains("passed: 1 succeeded"));

    report.succeeded = false;
    report.cancelled = true;
    let mut out = Vec::new();
    write_report(&mut out, &report)?;
    assert!(String::from_utf8(out)?.contains("cancelled: 1 succeeded"));
    Ok(())
}

#[test]
fn job_list_groups_jobs_by_stage() -> TestResult {
    let pipeline = resolve_yaml(
        r#"
workflow:
  name: nightly
stages: [build, test]
compile:
  stage: build
  script: [make]
unit:
  stage: test
  needs: [compile]
  allow_failure: true
  script: [test]
"#,
    )?;

    let mut out = Vec::new();
    write_job_list(&mut out, &pipeline)?;
    let text = String::from_utf8(out)?;

    assert_eq!(
        text,
        "pipeline: nightly\n\
         build:\n  - compile (when: on_success)\n\
         test:\n  - unit (when: on_success, allow_failure) needs: [compile]\n"
    );
    Ok(())
}

#[test]
fn job_list_notes_a_stopped_workflow() -> TestResult {
    let pipeline = resolve_yaml_with(
        r#"
workflow:
  rules:
    - if: $SKIP
      when: never
    - when: always
job:
  script: [x]
"#,
        &MapFetcher::new(),
        &options_with_vars(&[("SKIP", "1")]),
    )?;

    let mut out = Vec::new();
    write_job_list(&mut out, &pipeline)?;
    let text = String::from_utf8(out)?;
    assert!(text.starts_with("workflow rules prevent this pipeline from running\n"), "{text}");
    Ok(())
}
