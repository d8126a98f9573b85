// src/config/job.rs

//! Fully resolved pipeline: the output of the resolver.
//!
//! Everything here is immutable once produced; the scheduler only reads it.

use indexmap::IndexMap;
use serde_yaml::Value;

use crate::config::model::{
    AllowFailure, ArtifactsSpec, CacheSpec, EnvironmentSpec, ImageSpec, NeedSpec, RuleSpec,
    ServiceSpec,
};
use crate::types::When;
use crate::variables::Environment;

pub const PRE_STAGE: &str = ".pre";
pub const POST_STAGE: &str = ".post";
pub const DEFAULT_STAGES: &[&str] = &["build", "test", "deploy"];
pub const DEFAULT_JOB_STAGE: &str = "test";

/// A stage and its position in the ordered stage list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub name: String,
    pub index: usize,
}

/// The resolved definition of one job (or one `parallel` member).
#[derive(Debug, Clone, PartialEq)]
pub struct JobSpec {
    pub name: String,
    /// Name of the job before `parallel` expansion; equal to `name` otherwise.
    pub base_name: String,
    pub stage: String,
    pub before_script: Vec<String>,
    pub script: Vec<String>,
    pub after_script: Vec<String>,
    pub image: Option<ImageSpec>,
    pub services: Vec<ServiceSpec>,
    pub cache: Vec<CacheSpec>,
    pub artifacts: Option<ArtifactsSpec>,
    /// Global, job, matrix and rule variables, in that precedence.
    pub variables: Environment,
    /// Full layered environment handed to the runner (adds CLI and
    /// predefined variables on top of `variables`).
    pub env: Environment,
    pub rules: Vec<RuleSpec>,
    pub when: When,
    pub allow_failure: AllowFailure,
    /// `None` when the job has no `needs:` at all; `Some(vec![])` means
    /// "needs nothing" and lets the job start immediately.
    pub needs: Option<Vec<NeedSpec>>,
    pub dependencies: Option<Vec<String>>,
    pub trigger: Option<Value>,
    pub environment: Option<EnvironmentSpec>,
    pub tags: Vec<String>,
    pub interruptible: bool,
    pub timeout: Option<String>,
    /// 1-based index and total for `parallel` members.
    pub node_index: Option<u32>,
    pub node_total: Option<u32>,
    pub matrix: Environment,
}

impl JobSpec {
    pub fn declares_artifacts(&self) -> bool {
        self.artifacts.is_some()
    }

    pub fn is_trigger(&self) -> bool {
        self.trigger.is_some()
    }
}

/// Result of evaluating `workflow:rules`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowOutcome {
    /// False when the workflow rules resolved to `never`.
    pub run: bool,
    pub name: Option<String>,
}

impl Default for WorkflowOutcome {
    fn default() -> Self {
        Self {
            run: true,
            name: None,
        }
    }
}

/// Resolved jobs plus ordered stages.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPipeline {
    pub stages: Vec<Stage>,
    /// Jobs in declaration order (parallel members in place of their base job).
    pub jobs: IndexMap<String, JobSpec>,
    pub variables: Environment,
    pub workflow: WorkflowOutcome,
}

impl ResolvedPipeline {
    pub fn stage_index(&self, name: &str) -> Option<usize> {
        self.stages.iter().find(|s| s.name == name).map(|s| s.index)
    }

    pub fn job(&self, name: &str) -> Option<&JobSpec> {
        self.jobs.get(name)
    }

    /// Jobs of a stage, in declaration order.
    pub fn jobs_in_stage<'a>(&'a self, stage: &'a str) -> impl Iterator<Item = &'a JobSpec> + 'a {
        self.jobs.values().filter(move |job| job.stage == stage)
    }
}
