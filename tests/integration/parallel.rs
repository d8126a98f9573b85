// tests/integration/parallel.rs

use std::error::Error;

use localci::config::model::NeedSpec;
use localci::errors::LocalCiError;
use localci_test_utils::resolve_yaml;

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn parallel_count_names_members_and_sets_node_variables() -> TestResult {
    let pipeline = resolve_yaml(
        r#"
test:
  parallel: 3
  script: ["echo $CI_NODE_INDEX"]
"#,
    )?;

    let names: Vec<&str> = pipeline.jobs.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["test 1/3", "test 2/3", "test 3/3"]);

    let second = &pipeline.jobs["test 2/3"];
    assert_eq!(second.base_name, "test");
    assert_eq!(second.node_index, Some(2));
    assert_eq!(second.node_total, Some(3));
    assert_eq!(second.env["CI_NODE_INDEX"], "2");
    assert_eq!(second.env["CI_NODE_TOTAL"], "3");
    assert_eq!(second.env["CI_JOB_NAME"], "test 2/3");
    Ok(())
}

#[test]
fn matrix_expands_each_entry_as_a_cartesian_product() -> TestResult {
    let pipeline = resolve_yaml(
        r#"
deploy:
  script: ["deploy $PROVIDER $REGION"]
  parallel:
    matrix:
      - PROVIDER: aws
        REGION: [us-east-1, eu-west-1]
      - PROVIDER: [gcp]
        REGION: europe-west4
"#,
    )?;

    let names: Vec<&str> = pipeline.jobs.keys().map(String::as_str).collect();
    assert_eq!(
        names,
        vec![
            "deploy: [aws, us-east-1]",
            "deploy: [aws, eu-west-1]",
            "deploy: [gcp, europe-west4]",
        ]
    );

    let job = &pipeline.jobs["deploy: [aws, eu-west-1]"];
    assert_eq!(job.matrix["PROVIDER"], "aws");
    assert_eq!(job.variables["REGION"], "eu-west-1");
    assert_eq!(job.env["REGION"], "eu-west-1");
    Ok(())
}

#[test]
fn needs_on_a_parallel_job_fan_out_to_every_member() -> TestResult {
    let pipeline = resolve_yaml(
        r#"
stages: [build, test]
build:
  stage: build
  parallel: 2
  script: [b]
  artifacts:
    paths: [out/]
report:
  stage: test
  needs: [build]
  dependencies: [build]
  script: [r]
"#,
    )?;

    let report = &pipeline.jobs["report"];
    assert_eq!(
        report.needs,
        Some(vec![NeedSpec::new("build 1/2"), NeedSpec::new("build 2/2")])
    );
    assert_eq!(
        report.dependencies,
        Some(vec!["build 1/2".to_string(), "build 2/2".to_string()])
    );
    Ok(())
}

#[test]
fn parallel_count_out_of_range_is_rejected() {
    for count in [0, 1, 201] {
        let yaml = format!("job:\n  parallel: {count}\n  script: [x]\n");
        match resolve_yaml(&yaml) {
            Err(LocalCiError::ConfigError(msg)) => {
                assert!(msg.contains("parallel"), "{msg}");
            }
            other => panic!("expected ConfigError for parallel {count}, got {other:?}"),
        }
    }
}

#[test]
fn matrix_larger_than_the_limit_is_rejected() {
    let values: Vec<String> = (0..15).map(|i| format!("v{i}")).collect();
    let list = values.join(", ");
    let yaml = format!(
        "job:\n  script: [x]\n  parallel:\n    matrix:\n      - A: [{list}]\n        B: [{list}]\n"
    );

    match resolve_yaml(&yaml) {
        Err(LocalCiError::ConfigError(msg)) => assert!(msg.contains("at most 200"), "{msg}"),
        other => panic!("expected ConfigError, got {other:?}"),
    }
}

#[test]
fn huge_matrix_is_rejected_before_any_member_is_built() {
    let list = (0..10).map(|i| format!("v{i}")).collect::<Vec<_>>().join(", ");
    let keys: String = (0..8)
        .map(|k| format!("      {}K{k}: [{list}]\n", if k == 0 { "- " } else { "  " }))
        .collect();
    let yaml = format!("job:\n  script: [x]\n  parallel:\n    matrix:\n{keys}");

    match resolve_yaml(&yaml) {
        Err(LocalCiError::ConfigError(msg)) => {
            assert!(msg.contains("100000000 jobs"), "{msg}");
            assert!(msg.contains("at most 200"), "{msg}");
        }
        other => panic!("expected ConfigError, got {other:?}"),
    }
}

#[test]
fn duplicate_matrix_members_are_rejected() {
    let result = resolve_yaml(
        r#"
job:
  script: [x]
  parallel:
    matrix:
      - A: one
      - A: one
"#,
    );

    match result {
        Err(LocalCiError::ConfigError(msg)) => assert!(msg.contains("more than once"), "{msg}"),
        other => panic!("expected ConfigError, got {other:?}"),
    }
}
