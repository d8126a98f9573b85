// src/config/model.rs

//! Typed mapping of the pipeline YAML, before resolution.
//!
//! Every job field is optional here: a job definition may be partial until
//! `extends` and the default cascade have been applied. Fields that accept
//! several shapes (`image: alpine` vs `image: { name: alpine }`) are
//! normalised into one struct through a private `*Repr` type.

use std::fmt;

use indexmap::IndexMap;
use serde::Deserialize;
use serde_yaml::Value;

use crate::config::merge::{merge_fields, replace_on_merge, Merge};
use crate::types::When;

/// Top-level keys that are never job definitions.
pub const RESERVED_KEYWORDS: &[&str] = &[
    "after_script",
    "before_script",
    "cache",
    "default",
    "image",
    "include",
    "services",
    "spec",
    "stages",
    "types",
    "variables",
    "workflow",
];

/// Names a visible job may not use.
pub const ILLEGAL_JOB_NAMES: &[&str] = &["local", "pages:deploy", "true", "false", "nil"];

/// A value that may be written as one item or as a list.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

impl<T: Merge> Merge for OneOrMany<T> {
    fn merge(&mut self, later: Self) {
        match (self, later) {
            (OneOrMany::One(current), OneOrMany::One(later)) => current.merge(later),
            (current, later) => *current = later,
        }
    }
}

/// YAML scalar that we treat as text (`VERSION: 3` and `VERSION: "3"` are
/// the same variable).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Text(String),
    Number(serde_yaml::Number),
    Bool(bool),
}

impl ScalarValue {
    pub fn as_text(&self) -> String {
        match self {
            ScalarValue::Text(s) => s.clone(),
            ScalarValue::Number(n) => n.to_string(),
            ScalarValue::Bool(b) => b.to_string(),
        }
    }
}

/// `variables:` entry: a scalar or `{ value, description, expand }`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum VariableValue {
    Scalar(ScalarValue),
    Full {
        #[serde(default)]
        value: Option<ScalarValue>,
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        expand: Option<bool>,
    },
}

impl VariableValue {
    pub fn as_text(&self) -> String {
        match self {
            VariableValue::Scalar(s) => s.as_text(),
            VariableValue::Full { value, .. } => {
                value.as_ref().map(ScalarValue::as_text).unwrap_or_default()
            }
        }
    }
}

/// Script lines, flattened from nested lists (as produced by `!reference`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "ScriptRepr")]
pub struct ScriptLines(pub Vec<String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum ScriptRepr {
    Lines(Vec<ScriptRepr>),
    Line(ScalarValue),
}

impl ScriptRepr {
    fn flatten_into(self, out: &mut Vec<String>) {
        match self {
            ScriptRepr::Line(line) => out.push(line.as_text()),
            ScriptRepr::Lines(lines) => {
                for line in lines {
                    line.flatten_into(out);
                }
            }
        }
    }
}

impl From<ScriptRepr> for ScriptLines {
    fn from(repr: ScriptRepr) -> Self {
        let mut lines = Vec::new();
        repr.flatten_into(&mut lines);
        ScriptLines(lines)
    }
}

impl ScriptLines {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "ImageRepr")]
pub struct ImageSpec {
    pub name: Option<String>,
    pub entrypoint: Option<Vec<String>>,
    pub pull_policy: Option<Vec<String>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ImageRepr {
    Name(String),
    Full {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        entrypoint: Option<Vec<String>>,
        #[serde(default)]
        pull_policy: Option<OneOrMany<String>>,
    },
}

impl From<ImageRepr> for ImageSpec {
    fn from(repr: ImageRepr) -> Self {
        match repr {
            ImageRepr::Name(name) => ImageSpec {
                name: Some(name),
                ..ImageSpec::default()
            },
            ImageRepr::Full {
                name,
                entrypoint,
                pull_policy,
            } => ImageSpec {
                name,
                entrypoint,
                pull_policy: pull_policy.map(OneOrMany::into_vec),
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "ServiceRepr")]
pub struct ServiceSpec {
    pub name: String,
    pub alias: Option<String>,
    pub entrypoint: Option<Vec<String>>,
    pub command: Option<Vec<String>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ServiceRepr {
    Name(String),
    Full {
        name: String,
        #[serde(default)]
        alias: Option<String>,
        #[serde(default)]
        entrypoint: Option<Vec<String>>,
        #[serde(default)]
        command: Option<Vec<String>>,
    },
}

impl From<ServiceRepr> for ServiceSpec {
    fn from(repr: ServiceRepr) -> Self {
        match repr {
            ServiceRepr::Name(name) => ServiceSpec {
                name,
                ..ServiceSpec::default()
            },
            ServiceRepr::Full {
                name,
                alias,
                entrypoint,
                command,
            } => ServiceSpec {
                name,
                alias,
                entrypoint,
                command,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum CacheKey {
    Literal(ScalarValue),
    Files {
        files: Vec<String>,
        #[serde(default)]
        prefix: Option<String>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CacheSpec {
    pub key: Option<CacheKey>,
    pub paths: Option<Vec<String>>,
    pub policy: Option<String>,
    pub when: Option<String>,
    pub untracked: Option<bool>,
    pub fallback_keys: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ArtifactsSpec {
    pub name: Option<String>,
    pub paths: Option<Vec<String>>,
    pub exclude: Option<Vec<String>>,
    pub when: Option<String>,
    pub expire_in: Option<String>,
    pub untracked: Option<bool>,
    pub reports: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "EnvironmentRepr")]
pub struct EnvironmentSpec {
    pub name: Option<String>,
    pub url: Option<String>,
    pub action: Option<String>,
    pub deployment_tier: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EnvironmentRepr {
    Name(String),
    Full {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        action: Option<String>,
        #[serde(default)]
        deployment_tier: Option<String>,
    },
}

impl From<EnvironmentRepr> for EnvironmentSpec {
    fn from(repr: EnvironmentRepr) -> Self {
        match repr {
            EnvironmentRepr::Name(name) => EnvironmentSpec {
                name: Some(name),
                ..EnvironmentSpec::default()
            },
            EnvironmentRepr::Full {
                name,
                url,
                action,
                deployment_tier,
            } => EnvironmentSpec {
                name,
                url,
                action,
                deployment_tier,
            },
        }
    }
}

/// One `needs:` entry.
///
/// A need qualified with `pipeline` or `project` points outside this
/// pipeline; it is kept for reporting but never waited on.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "NeedRepr")]
pub struct NeedSpec {
    pub job: String,
    pub optional: bool,
    pub artifacts: bool,
    pub pipeline: Option<String>,
    pub project: Option<String>,
    pub git_ref: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NeedRepr {
    Job(String),
    Full {
        job: String,
        #[serde(default)]
        optional: Option<bool>,
        #[serde(default)]
        artifacts: Option<bool>,
        #[serde(default)]
        pipeline: Option<String>,
        #[serde(default)]
        project: Option<String>,
        #[serde(default, rename = "ref")]
        git_ref: Option<String>,
    },
}

impl From<NeedRepr> for NeedSpec {
    fn from(repr: NeedRepr) -> Self {
        match repr {
            NeedRepr::Job(job) => NeedSpec::new(job),
            NeedRepr::Full {
                job,
                optional,
                artifacts,
                pipeline,
                project,
                git_ref,
            } => NeedSpec {
                job,
                optional: optional.unwrap_or(false),
                artifacts: artifacts.unwrap_or(true),
                pipeline,
                project,
                git_ref,
            },
        }
    }
}

impl NeedSpec {
    pub fn new(job: impl Into<String>) -> Self {
        Self {
            job: job.into(),
            optional: false,
            artifacts: true,
            pipeline: None,
            project: None,
            git_ref: None,
        }
    }

    /// True when the need refers to another pipeline or project.
    pub fn is_qualified(&self) -> bool {
        self.pipeline.is_some() || self.project.is_some()
    }
}

/// `allow_failure: true|false` or `allow_failure: { exit_codes: [...] }`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "AllowFailureRepr")]
pub enum AllowFailure {
    Bool(bool),
    ExitCodes(Vec<i32>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AllowFailureRepr {
    Bool(bool),
    ExitCodes { exit_codes: OneOrMany<i32> },
}

impl From<AllowFailureRepr> for AllowFailure {
    fn from(repr: AllowFailureRepr) -> Self {
        match repr {
            AllowFailureRepr::Bool(b) => AllowFailure::Bool(b),
            AllowFailureRepr::ExitCodes { exit_codes } => {
                AllowFailure::ExitCodes(exit_codes.into_vec())
            }
        }
    }
}

impl Default for AllowFailure {
    fn default() -> Self {
        AllowFailure::Bool(false)
    }
}

impl AllowFailure {
    /// Whether a failure with `exit_code` is tolerated.
    pub fn permits(&self, exit_code: i32) -> bool {
        match self {
            AllowFailure::Bool(b) => *b,
            AllowFailure::ExitCodes(codes) => codes.contains(&exit_code),
        }
    }

    /// Whether any failure may be tolerated (reporting view).
    pub fn is_allowed(&self) -> bool {
        match self {
            AllowFailure::Bool(b) => *b,
            AllowFailure::ExitCodes(codes) => !codes.is_empty(),
        }
    }
}

/// One entry of `rules:`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RuleSpec {
    #[serde(rename = "if")]
    pub if_expr: Option<String>,
    pub when: Option<When>,
    pub allow_failure: Option<AllowFailure>,
    pub variables: Option<IndexMap<String, VariableValue>>,
    /// Accepted for compatibility; treated as satisfied.
    pub changes: Option<Value>,
    /// Accepted for compatibility; treated as satisfied.
    pub exists: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Parallel {
    Count(u32),
    Matrix {
        matrix: Vec<IndexMap<String, OneOrMany<ScalarValue>>>,
    },
}

/// `inherit:` switches: `true`/`false` or the list of names to inherit.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum InheritSwitch {
    All(bool),
    Only(Vec<String>),
}

impl InheritSwitch {
    pub fn allows(&self, key: &str) -> bool {
        match self {
            InheritSwitch::All(b) => *b,
            InheritSwitch::Only(keys) => keys.iter().any(|k| k == key),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Inherit {
    pub default: Option<InheritSwitch>,
    pub variables: Option<InheritSwitch>,
}

impl Inherit {
    pub fn allows_default(&self, key: &str) -> bool {
        self.default.as_ref().is_none_or(|s| s.allows(key))
    }

    pub fn allows_variable(&self, key: &str) -> bool {
        self.variables.as_ref().is_none_or(|s| s.allows(key))
    }
}

/// A job definition as written (or partially merged).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RawJob {
    pub extends: Option<OneOrMany<String>>,
    pub stage: Option<String>,
    pub before_script: Option<ScriptLines>,
    pub script: Option<ScriptLines>,
    pub after_script: Option<ScriptLines>,
    pub image: Option<ImageSpec>,
    pub services: Option<Vec<ServiceSpec>>,
    pub cache: Option<OneOrMany<CacheSpec>>,
    pub artifacts: Option<ArtifactsSpec>,
    pub variables: Option<IndexMap<String, VariableValue>>,
    pub rules: Option<Vec<RuleSpec>>,
    pub when: Option<When>,
    pub allow_failure: Option<AllowFailure>,
    pub needs: Option<Vec<NeedSpec>>,
    pub dependencies: Option<Vec<String>>,
    pub trigger: Option<Value>,
    pub parallel: Option<Parallel>,
    pub environment: Option<EnvironmentSpec>,
    pub inherit: Option<Inherit>,
    pub tags: Option<Vec<String>>,
    pub interruptible: Option<bool>,
    pub timeout: Option<String>,
}

/// `default:` block.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct DefaultSpec {
    pub image: Option<ImageSpec>,
    pub services: Option<Vec<ServiceSpec>>,
    pub cache: Option<OneOrMany<CacheSpec>>,
    pub artifacts: Option<ArtifactsSpec>,
    pub before_script: Option<ScriptLines>,
    pub after_script: Option<ScriptLines>,
    pub tags: Option<Vec<String>>,
    pub interruptible: Option<bool>,
    pub timeout: Option<String>,
}

/// `workflow:` block.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct WorkflowSpec {
    pub name: Option<String>,
    pub rules: Option<Vec<RuleSpec>>,
}

replace_on_merge!(
    ScalarValue,
    VariableValue,
    ScriptLines,
    CacheKey,
    When,
    AllowFailure,
    Parallel,
    InheritSwitch,
    Vec<ServiceSpec>,
    Vec<RuleSpec>,
    Vec<NeedSpec>,
);

merge_fields!(ImageSpec {
    name,
    entrypoint,
    pull_policy
});
merge_fields!(CacheSpec {
    key,
    paths,
    policy,
    when,
    untracked,
    fallback_keys
});
merge_fields!(ArtifactsSpec {
    name,
    paths,
    exclude,
    when,
    expire_in,
    untracked,
    reports
});
merge_fields!(EnvironmentSpec {
    name,
    url,
    action,
    deployment_tier
});
merge_fields!(Inherit { default, variables });
merge_fields!(DefaultSpec {
    image,
    services,
    cache,
    artifacts,
    before_script,
    after_script,
    tags,
    interruptible,
    timeout,
});

// `extends` is consumed by the extends resolver and never merged.
merge_fields!(RawJob {
    stage,
    before_script,
    script,
    after_script,
    image,
    services,
    cache,
    artifacts,
    variables,
    rules,
    when,
    allow_failure,
    needs,
    dependencies,
    trigger,
    parallel,
    environment,
    inherit,
    tags,
    interruptible,
    timeout,
});

impl fmt::Display for NeedSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.project, &self.pipeline) {
            (Some(project), _) => write!(f, "{project}:{}", self.job),
            (None, Some(pipeline)) => write!(f, "pipeline {pipeline}:{}", self.job),
            (None, None) => f.write_str(&self.job),
        }
    }
}
