// tests/integration/error_handling.rs

use std::error::Error;
use std::io::Write;

use tempfile::NamedTempFile;

use localci::config::{load_pipeline, ResolveOptions};
use localci::errors::LocalCiError;
use localci_test_utils::fetcher::MapFetcher;
use localci_test_utils::resolve_yaml;

type TestResult = Result<(), Box<dyn Error>>;

/// Assert that `yaml` fails with a `ConfigError` mentioning `needle`.
fn expect_config_error(yaml: &str, needle: &str) {
    match resolve_yaml(yaml) {
        Err(LocalCiError::ConfigError(msg)) => {
            assert!(msg.contains(needle), "expected {needle:?} in {msg:?}");
        }
        other => panic!("expected ConfigError containing {needle:?}, got {other:?}"),
    }
}

#[test]
fn pipeline_without_visible_jobs_is_rejected() {
    expect_config_error(".template:\n  script: [x]\n", "defines no jobs");
    expect_config_error("variables:\n  A: b\n", "defines no jobs");
}

#[test]
fn job_without_script_is_rejected() {
    expect_config_error("job:\n  stage: test\n", "non-empty `script`");
    expect_config_error("job:\n  script: []\n", "non-empty `script`");
}

#[test]
fn trigger_job_needs_no_script() -> TestResult {
    let pipeline = resolve_yaml("downstream:\n  trigger: group/other\n")?;
    assert!(pipeline.jobs["downstream"].is_trigger());
    Ok(())
}

#[test]
fn unknown_stage_lists_the_available_stages() {
    expect_config_error(
        "stages: [build]\njob:\n  stage: release\n  script: [x]\n",
        "chosen stage 'release' does not exist",
    );
}

#[test]
fn undefined_and_self_needs_are_rejected() {
    expect_config_error(
        "job:\n  needs: [ghost]\n  script: [x]\n",
        "`needs` references undefined job 'ghost'",
    );
    expect_config_error("job:\n  needs: [job]\n  script: [x]\n", "cannot need itself");
}

#[test]
fn dependencies_must_exist_and_be_needed() {
    expect_config_error(
        "job:\n  dependencies: [ghost]\n  script: [x]\n",
        "`dependencies` references undefined job 'ghost'",
    );
    expect_config_error(
        r#"
stages: [build, test]
a:
  stage: build
  script: [a]
b:
  stage: build
  script: [b]
c:
  stage: test
  needs: [a]
  dependencies: [b]
  script: [c]
"#,
        "dependency 'b' must also be listed in `needs`",
    );
}

#[test]
fn malformed_top_level_shapes_are_rejected() {
    expect_config_error("stages: build\njob:\n  script: [x]\n", "`stages` must be an array");
    expect_config_error("job: just a string\n", "job config should be a mapping");
    expect_config_error("job:\n  script: [x]\n  cache: vendor/\n", "`cache` must be a mapping");
}

#[test]
fn reserved_job_names_are_rejected() {
    expect_config_error("local:\n  script: [x]\n", "reserved");
}

#[test]
fn invalid_field_type_names_the_job_and_field() {
    match resolve_yaml("job:\n  script: [x]\n  interruptible: maybe\n") {
        Err(LocalCiError::ConfigError(msg)) => {
            assert!(msg.starts_with("job:"), "{msg}");
            assert!(msg.contains("interruptible"), "{msg}");
        }
        other => panic!("expected ConfigError, got {other:?}"),
    }
}

#[test]
fn invalid_yaml_is_a_yaml_error() {
    match resolve_yaml("job: [unclosed\n") {
        Err(LocalCiError::YamlError(_)) => {}
        other => panic!("expected YamlError, got {other:?}"),
    }
}

#[test]
fn missing_pipeline_file_is_an_io_error() -> TestResult {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("missing.yml");

    match load_pipeline(&path, &MapFetcher::new(), &ResolveOptions::default()) {
        Err(LocalCiError::IoError(_)) => {}
        other => panic!("expected IoError, got {other:?}"),
    }
    Ok(())
}

#[test]
fn pipeline_file_on_disk_resolves() -> TestResult {
    let mut file = NamedTempFile::new()?;
    writeln!(file, "build:\n  stage: build\n  script: [make]")?;

    let pipeline = load_pipeline(file.path(), &MapFetcher::new(), &ResolveOptions::default())?;
    assert_eq!(pipeline.jobs["build"].script, vec!["make".to_string()]);
    Ok(())
}
