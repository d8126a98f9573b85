// tests/integration/includes.rs

use std::error::Error;
use std::sync::Arc;

use localci::config::{resolve, parse_documents, FsIncludeFetcher, IncludeSource, ResolveOptions};
use localci::errors::LocalCiError;
use localci::fs::mock::MockFileSystem;
use localci_test_utils::fetcher::MapFetcher;
use localci_test_utils::{options_with_vars, resolve_yaml_with};

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn own_keys_override_later_includes_override_earlier_ones() -> TestResult {
    let fetcher = MapFetcher::new()
        .local(
            "first.yml",
            r#"
variables:
  FROM: first
  FIRST_ONLY: "1"
job:
  stage: build
  script: ["first"]
"#,
        )
        .local(
            "second.yml",
            r#"
variables:
  FROM: second
job:
  script: ["second"]
"#,
        );

    let pipeline = resolve_yaml_with(
        r#"
include:
  - first.yml
  - local: second.yml
variables:
  OWN: "yes"
job:
  tags: [own]
"#,
        &fetcher,
        &ResolveOptions::default(),
    )?;

    let job = &pipeline.jobs["job"];
    assert_eq!(job.script, vec!["second".to_string()]);
    assert_eq!(job.stage, "build");
    assert_eq!(job.tags, vec!["own".to_string()]);
    assert_eq!(pipeline.variables["FROM"], "second");
    assert_eq!(pipeline.variables["FIRST_ONLY"], "1");
    assert_eq!(pipeline.variables["OWN"], "yes");

    let pipeline = resolve_yaml_with(
        r#"
include: [first.yml, second.yml]
job:
  script: ["own"]
"#,
        &fetcher,
        &ResolveOptions::default(),
    )?;
    assert_eq!(pipeline.jobs["job"].script, vec!["own".to_string()]);

    Ok(())
}

#[test]
fn local_include_inside_project_include_stays_in_that_project() -> TestResult {
    let fetcher = MapFetcher::new()
        .project(
            "group/templates",
            "v1",
            "ci/main.yml",
            r#"
include:
  - local: /ci/jobs.yml
"#,
        )
        .project(
            "group/templates",
            "v1",
            "ci/jobs.yml",
            r#"
lint:
  script: ["lint"]
"#,
        );

    let pipeline = resolve_yaml_with(
        r#"
include:
  - project: group/templates
    ref: v1
    file: ci/main.yml
"#,
        &fetcher,
        &ResolveOptions::default(),
    )?;

    assert!(pipeline.job("lint").is_some());
    assert!(fetcher.fetched().contains(&IncludeSource::Project {
        project: "group/templates".to_string(),
        git_ref: "v1".to_string(),
        file: "ci/jobs.yml".to_string(),
    }));
    Ok(())
}

#[test]
fn project_ref_defaults_to_head_and_file_may_be_a_list() -> TestResult {
    let fetcher = MapFetcher::new()
        .project("group/p", "HEAD", "a.yml", "a:\n  script: [a]\n")
        .project("group/p", "HEAD", "b.yml", "b:\n  script: [b]\n");

    let pipeline = resolve_yaml_with(
        r#"
include:
  project: group/p
  file: [a.yml, b.yml]
"#,
        &fetcher,
        &ResolveOptions::default(),
    )?;

    let names: Vec<&str> = pipeline.jobs.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["a", "b"]);
    Ok(())
}

#[test]
fn local_include_inside_remote_include_resolves_against_the_url() -> TestResult {
    let fetcher = MapFetcher::new()
        .remote(
            "https://example.com/ci/main.yml",
            "include:\n  - local: jobs.yml\n",
        )
        .remote(
            "https://example.com/ci/jobs.yml",
            "remote-job:\n  script: [remote]\n",
        );

    let pipeline = resolve_yaml_with(
        "include: https://example.com/ci/main.yml\n",
        &fetcher,
        &ResolveOptions::default(),
    )?;

    assert!(pipeline.job("remote-job").is_some());
    Ok(())
}

#[test]
fn template_includes_are_fetched_by_name() -> TestResult {
    let fetcher = MapFetcher::new().template(
        "Security/SAST.gitlab-ci.yml",
        "sast:\n  stage: test\n  script: [scan]\n",
    );

    let pipeline = resolve_yaml_with(
        "include:\n  - template: Security/SAST.gitlab-ci.yml\n",
        &fetcher,
        &ResolveOptions::default(),
    )?;
    assert!(pipeline.job("sast").is_some());
    Ok(())
}

#[test]
fn include_rules_skip_includes_whose_rules_say_never() -> TestResult {
    let fetcher = MapFetcher::new().local("extra.yml", "extra:\n  script: [extra]\n");
    let yaml = r#"
include:
  - local: extra.yml
    rules:
      - if: $WITH_EXTRA == "yes"
main:
  script: [main]
"#;

    let without = resolve_yaml_with(yaml, &fetcher, &ResolveOptions::default())?;
    assert!(without.job("extra").is_none());
    assert!(fetcher.fetched().is_empty());

    let with = resolve_yaml_with(yaml, &fetcher, &options_with_vars(&[("WITH_EXTRA", "yes")]))?;
    assert!(with.job("extra").is_some());
    Ok(())
}

#[test]
fn self_including_document_hits_the_depth_cap() {
    let fetcher = MapFetcher::new().local("loop.yml", "include: loop.yml\n");

    let result = resolve_yaml_with(
        "include: loop.yml\njob:\n  script: [x]\n",
        &fetcher,
        &ResolveOptions::default(),
    );

    match result {
        Err(LocalCiError::ConfigError(msg)) => assert!(msg.contains("circular include"), "{msg}"),
        other => panic!("expected ConfigError, got {other:?}"),
    }
}

#[test]
fn missing_include_could_not_be_fetched() {
    let result = resolve_yaml_with(
        "include: nope.yml\njob:\n  script: [x]\n",
        &MapFetcher::new(),
        &ResolveOptions::default(),
    );

    match result {
        Err(LocalCiError::ConfigError(msg)) => {
            assert!(msg.contains("could not be fetched"), "{msg}");
            assert!(msg.contains("nope.yml"), "{msg}");
        }
        other => panic!("expected ConfigError, got {other:?}"),
    }
}

#[test]
fn local_glob_includes_expand_through_the_filesystem() -> TestResult {
    let fs = MockFileSystem::new();
    fs.add_file("./ci/a.yml", "a:\n  script: [a]\n");
    fs.add_file("./ci/b.yml", "b:\n  script: [b]\n");
    fs.add_file("./ci/nested/c.yml", "c:\n  script: [c]\n");
    let fetcher = FsIncludeFetcher::new(Arc::new(fs), ".");

    let pipeline = resolve(
        parse_documents("include:\n  - local: 'ci/*.yml'\n")?,
        &fetcher,
        &ResolveOptions::default(),
    )?;

    let names: Vec<&str> = pipeline.jobs.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["a", "b"]);

    let pipeline = resolve(
        parse_documents("include:\n  - local: 'ci/**/*.yml'\n")?,
        &fetcher,
        &ResolveOptions::default(),
    )?;
    assert!(pipeline.job("c").is_some());
    Ok(())
}

#[test]
fn fs_fetcher_reads_templates_from_the_local_cache() -> TestResult {
    let fs = MockFileSystem::new();
    fs.add_file("./.localci/templates/Base.yml", "base:\n  script: [base]\n");
    let fetcher = FsIncludeFetcher::new(Arc::new(fs), ".");

    let pipeline = resolve(
        parse_documents("include:\n  template: Base.yml\n")?,
        &fetcher,
        &ResolveOptions::default(),
    )?;
    assert!(pipeline.job("base").is_some());
    Ok(())
}

#[test]
fn later_documents_in_one_stream_win() -> TestResult {
    let pipeline = resolve(
        parse_documents(
            r#"
spec:
  inputs:
    env: {}
---
job:
  stage: build
  script: [first]
---
job:
  script: [second]
"#,
        )?,
        &MapFetcher::new(),
        &ResolveOptions::default(),
    )?;

    let job = &pipeline.jobs["job"];
    assert_eq!(job.script, vec!["second".to_string()]);
    assert_eq!(job.stage, "build");
    Ok(())
}
