// tests/integration/rules.rs

use std::error::Error;

use localci::config::model::{AllowFailure, RuleSpec};
use localci::errors::LocalCiError;
use localci::rules::{evaluate, select_rule};
use localci::types::When;
use localci::variables::Environment;
use localci_test_utils::{options_with_vars, resolve_yaml, resolve_yaml_with};
use localci_test_utils::fetcher::MapFetcher;

type TestResult = Result<(), Box<dyn Error>>;

fn vars(pairs: &[(&str, &str)]) -> Environment {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn rule(if_expr: Option<&str>, when: Option<When>) -> RuleSpec {
    RuleSpec {
        if_expr: if_expr.map(str::to_string),
        when,
        ..RuleSpec::default()
    }
}

#[test]
fn first_matching_rule_wins() -> TestResult {
    let rules = vec![
        rule(Some("$GITLAB_CI"), Some(When::Never)),
        rule(None, Some(When::OnSuccess)),
    ];

    let outcome = select_rule(&rules, &vars(&[("GITLAB_CI", "false")]), When::OnSuccess)?;
    assert_eq!(outcome.when, When::Never);
    assert_eq!(outcome.allow_failure, AllowFailure::Bool(false));

    let outcome = select_rule(&rules, &vars(&[]), When::OnSuccess)?;
    assert_eq!(outcome.when, When::OnSuccess);
    Ok(())
}

#[test]
fn no_matching_rule_means_never() -> TestResult {
    let rules = vec![rule(Some("$MISSING"), Some(When::Always))];
    let outcome = select_rule(&rules, &vars(&[]), When::OnSuccess)?;
    assert_eq!(outcome.when, When::Never);
    Ok(())
}

#[test]
fn matched_rule_defaults_follow_the_static_when() -> TestResult {
    let rules = vec![rule(None, None)];

    let outcome = select_rule(&rules, &vars(&[]), When::Manual)?;
    assert_eq!(outcome.when, When::OnSuccess);
    assert_eq!(outcome.allow_failure, AllowFailure::Bool(true));

    let outcome = select_rule(&rules, &vars(&[]), When::OnSuccess)?;
    assert_eq!(outcome.allow_failure, AllowFailure::Bool(false));
    Ok(())
}

#[test]
fn case_insensitive_regex_matches() -> TestResult {
    let env = vars(&[("VAR", "TESTVALUE")]);
    assert!(evaluate("$VAR =~ /testvalue/i", &env)?);
    assert!(!evaluate("$VAR =~ /testvalue/", &env)?);
    assert!(evaluate("$VAR !~ /testvalue/", &env)?);
    assert!(!evaluate("$VAR !~ /testvalue/i", &env)?);
    Ok(())
}

#[test]
fn undefined_left_side_never_matches() -> TestResult {
    let env = vars(&[]);
    assert!(!evaluate("$NOPE =~ /.*/", &env)?);
    assert!(evaluate("$NOPE !~ /.*/", &env)?);
    Ok(())
}

#[test]
fn null_comparisons_test_definedness() -> TestResult {
    let env = vars(&[("EMPTY", "")]);
    assert!(evaluate("$EMPTY != null", &env)?);
    assert!(evaluate("$UNSET == null", &env)?);
    assert!(!evaluate("$EMPTY", &env)?);
    assert!(!evaluate("$UNSET", &env)?);
    Ok(())
}

#[test]
fn and_binds_tighter_than_or() -> TestResult {
    let env = vars(&[("A", "1")]);
    // true || (false && false)
    assert!(evaluate("$A || $B && $C", &env)?);
    // (true || false) && false
    assert!(!evaluate("($A || $B) && $C", &env)?);
    Ok(())
}

#[test]
fn string_comparisons_and_nested_variables() -> TestResult {
    let env = vars(&[
        ("ENV", "PROD"),
        ("URL_PROD", "https://prod"),
        ("BRANCH", "main"),
    ]);
    assert!(evaluate("${URL_${ENV}} == \"https://prod\"", &env)?);
    assert!(evaluate("$BRANCH == 'main' && $BRANCH != \"dev\"", &env)?);
    Ok(())
}

#[test]
fn patterns_may_come_from_quoted_strings_and_variables() -> TestResult {
    let env = vars(&[("BRANCH", "release/1.2"), ("PATTERN", "/^release\\//")]);
    assert!(evaluate("$BRANCH =~ \"/^release/\"", &env)?);
    assert!(evaluate("$BRANCH =~ $PATTERN", &env)?);
    // An undefined pattern variable never matches.
    assert!(!evaluate("$BRANCH =~ $NO_PATTERN", &env)?);
    Ok(())
}

#[test]
fn non_regex_literal_after_match_operator_is_an_error() {
    match evaluate("$VAR =~ \"plain\"", &vars(&[("VAR", "plain")])) {
        Err(LocalCiError::RuleExpressionError(msg)) => assert!(msg.contains("regex"), "{msg}"),
        other => panic!("expected RuleExpressionError, got {other:?}"),
    }
}

#[test]
fn syntax_errors_are_rule_expression_errors() {
    for expr in ["$A ==", "($A", "$A && && $B", "word", "$A = $B", ""] {
        match evaluate(expr, &vars(&[("A", "1")])) {
            Err(LocalCiError::RuleExpressionError(_)) => {}
            other => panic!("expected RuleExpressionError for `{expr}`, got {other:?}"),
        }
    }
}

#[test]
fn job_rules_use_cli_and_predefined_variables() -> TestResult {
    let yaml = r#"
variables:
  DEPLOY: "no"
deploy:
  stage: deploy
  script: [deploy]
  rules:
    - if: $DEPLOY == "yes" && $CI_JOB_STAGE == "deploy"
      when: manual
      variables:
        TARGET: prod
    - when: never
"#;

    let pipeline = resolve_yaml(yaml)?;
    assert_eq!(pipeline.jobs["deploy"].when, When::Never);

    let pipeline = resolve_yaml_with(
        yaml,
        &MapFetcher::new(),
        &options_with_vars(&[("DEPLOY", "yes")]),
    )?;
    let job = &pipeline.jobs["deploy"];
    assert_eq!(job.when, When::Manual);
    // Rules without allow_failure on a non-manual job: not allowed to fail.
    assert_eq!(job.allow_failure, AllowFailure::Bool(false));
    assert_eq!(job.variables["TARGET"], "prod");
    assert_eq!(job.env["TARGET"], "prod");
    Ok(())
}

#[test]
fn malformed_rule_in_job_fails_resolution_naming_the_job() {
    let result = resolve_yaml(
        r#"
job:
  script: [x]
  rules:
    - if: $A =~ "nope"
"#,
    );

    match result {
        Err(LocalCiError::RuleExpressionError(msg)) => assert!(msg.contains("job"), "{msg}"),
        other => panic!("expected RuleExpressionError, got {other:?}"),
    }
}

#[test]
fn workflow_rules_can_stop_the_pipeline() -> TestResult {
    let yaml = r#"
workflow:
  name: "pipeline for $SOURCE"
  rules:
    - if: $SOURCE == "schedule"
      when: never
    - when: always
job:
  script: [x]
"#;

    let pipeline = resolve_yaml_with(
        yaml,
        &MapFetcher::new(),
        &options_with_vars(&[("SOURCE", "schedule")]),
    )?;
    assert!(!pipeline.workflow.run);

    let pipeline = resolve_yaml_with(
        yaml,
        &MapFetcher::new(),
        &options_with_vars(&[("SOURCE", "push")]),
    )?;
    assert!(pipeline.workflow.run);
    assert_eq!(pipeline.workflow.name.as_deref(), Some("pipeline for push"));
    Ok(())
}

#[test]
fn chained_variables_resolve_before_rules_are_evaluated() -> TestResult {
    let pipeline = resolve_yaml(
        r#"
variables:
  A: "$B"
  B: "${C}"
  C: "x"
  LOOP: "$LOOP-1"
  PING: "$PONG"
  PONG: "$PING"
job:
  script: [x]
  rules:
    - if: $A == "x"
"#,
    )?;

    let job = &pipeline.jobs["job"];
    assert_eq!(job.when, When::OnSuccess);
    assert_eq!(job.env["A"], "x");
    assert_eq!(job.env["B"], "x");
    // References back into the chain being expanded stay as written.
    assert_eq!(job.env["LOOP"], "$LOOP-1");
    assert_eq!(job.env["PING"], "$PING");
    assert_eq!(job.env["PONG"], "$PONG");
    Ok(())
}
