// tests/integration/references.rs

use std::error::Error;

use localci::config::reference::expand_references;
use localci::errors::LocalCiError;
use localci_test_utils::resolve_yaml;
use serde_yaml::Value;

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn reference_in_script_is_spliced() -> TestResult {
    let pipeline = resolve_yaml(
        r#"
.setup:
  script:
    - echo setup
    - echo more
job:
  script:
    - !reference [.setup, script]
    - echo job
"#,
    )?;

    assert_eq!(
        pipeline.jobs["job"].script,
        vec![
            "echo setup".to_string(),
            "echo more".to_string(),
            "echo job".to_string()
        ]
    );
    Ok(())
}

#[test]
fn reference_to_a_mapping_replaces_the_value() -> TestResult {
    let pipeline = resolve_yaml(
        r#"
.vars:
  variables:
    REGION: eu
job:
  variables: !reference [.vars, variables]
  script: ["echo $REGION"]
"#,
    )?;

    assert_eq!(pipeline.jobs["job"].variables["REGION"], "eu");
    Ok(())
}

#[test]
fn references_inside_referenced_trees_are_expanded() -> TestResult {
    let pipeline = resolve_yaml(
        r#"
.a:
  script:
    - echo a
.b:
  script:
    - !reference [.a, script]
    - echo b
job:
  script:
    - !reference [.b, script]
"#,
    )?;

    assert_eq!(
        pipeline.jobs["job"].script,
        vec!["echo a".to_string(), "echo b".to_string()]
    );
    Ok(())
}

#[test]
fn missing_reference_key_is_fatal() {
    let result = resolve_yaml(
        r#"
job:
  script:
    - !reference [.nothing, script]
"#,
    );

    match result {
        Err(LocalCiError::ConfigError(msg)) => {
            assert!(msg.contains("could not be found"), "{msg}");
            assert!(msg.contains(".nothing"), "{msg}");
        }
        other => panic!("expected ConfigError, got {other:?}"),
    }
}

#[test]
fn cyclic_references_report_the_path() -> TestResult {
    let root: Value = serde_yaml::from_str(
        r#"
a:
  b: !reference [c, d]
c:
  d: !reference [a, b]
"#,
    )?;

    match expand_references(root) {
        Err(LocalCiError::ConfigError(msg)) => {
            assert!(msg.contains("circular !reference"), "{msg}");
            assert!(msg.contains("a.b -> c.d -> a.b") || msg.contains("c.d -> a.b -> c.d"), "{msg}");
        }
        other => panic!("expected ConfigError, got {other:?}"),
    }
    Ok(())
}

#[test]
fn reference_outside_a_list_is_not_spliced() -> TestResult {
    let root: Value = serde_yaml::from_str(
        r#"
.list: [x, y]
job:
  tags: !reference [.list]
"#,
    )?;

    let expanded = expand_references(root)?;
    let tags = expanded
        .get("job")
        .and_then(|job| job.get("tags"))
        .ok_or("tags missing")?;
    assert_eq!(tags, &serde_yaml::from_str::<Value>("[x, y]")?);
    Ok(())
}

#[test]
fn reference_path_may_pass_through_another_reference() -> TestResult {
    let doc: Value = serde_yaml::from_str(
        r#"
.base:
  settings:
    image: alpine
    tags: [small]
.alias: !reference [.base, settings]
job:
  image: !reference [.alias, image]
  tags: !reference [.base, settings, tags]
"#,
    )?;

    let expanded = expand_references(doc)?;
    let job = &expanded["job"];
    assert_eq!(job["image"], Value::from("alpine"));
    assert_eq!(job["tags"], serde_yaml::from_str::<Value>("[small]")?);
    // The source tree is left as it was apart from the expanded references.
    assert_eq!(expanded[".base"]["settings"]["image"], Value::from("alpine"));
    Ok(())
}
