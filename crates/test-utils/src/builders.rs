#![allow(dead_code)]

use serde_yaml::{Mapping, Value};

use localci::config::ResolvedPipeline;
use localci::errors::Result;

use crate::resolve_yaml;

/// Builder for pipeline YAML to simplify test setup.
#[derive(Debug, Clone, Default)]
pub struct PipelineBuilder {
    stages: Option<Vec<String>>,
    variables: Mapping,
    jobs: Vec<(String, Mapping)>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stages(mut self, stages: &[&str]) -> Self {
        self.stages = Some(stages.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn variable(mut self, key: &str, value: &str) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    pub fn with_job(mut self, name: &str, job: JobBuilder) -> Self {
        self.jobs.push((name.to_string(), job.build()));
        self
    }

    pub fn to_yaml(&self) -> String {
        let mut root = Mapping::new();
        if let Some(stages) = &self.stages {
            root.insert(
                "stages".into(),
                Value::Sequence(stages.iter().map(|s| s.as_str().into()).collect()),
            );
        }
        if !self.variables.is_empty() {
            root.insert("variables".into(), Value::Mapping(self.variables.clone()));
        }
        for (name, job) in &self.jobs {
            root.insert(name.as_str().into(), Value::Mapping(job.clone()));
        }
        serde_yaml::to_string(&Value::Mapping(root)).expect("Failed to serialise pipeline")
    }

    pub fn try_resolve(&self) -> Result<ResolvedPipeline> {
        resolve_yaml(&self.to_yaml())
    }

    pub fn build(self) -> ResolvedPipeline {
        self.try_resolve()
            .expect("Failed to build valid pipeline from builder")
    }
}

/// Builder for one job mapping.
#[derive(Debug, Clone)]
pub struct JobBuilder {
    job: Mapping,
}

impl JobBuilder {
    pub fn new(script: &str) -> Self {
        let mut job = Mapping::new();
        job.insert("script".into(), Value::Sequence(vec![script.into()]));
        Self { job }
    }

    pub fn stage(mut self, stage: &str) -> Self {
        self.job.insert("stage".into(), stage.into());
        self
    }

    pub fn needs(mut self, needs: &[&str]) -> Self {
        self.job.insert(
            "needs".into(),
            Value::Sequence(needs.iter().map(|n| (*n).into()).collect()),
        );
        self
    }

    pub fn optional_need(mut self, job: &str) -> Self {
        let mut need = Mapping::new();
        need.insert("job".into(), job.into());
        need.insert("optional".into(), true.into());
        self.push_need(Value::Mapping(need));
        self
    }

    fn push_need(&mut self, need: Value) {
        let entry = self
            .job
            .entry("needs".into())
            .or_insert_with(|| Value::Sequence(Vec::new()));
        if let Value::Sequence(needs) = entry {
            needs.push(need);
        }
    }

    pub fn when(mut self, when: &str) -> Self {
        self.job.insert("when".into(), when.into());
        self
    }

    pub fn allow_failure(mut self, allowed: bool) -> Self {
        self.job.insert("allow_failure".into(), allowed.into());
        self
    }

    pub fn allow_exit_codes(mut self, codes: &[i32]) -> Self {
        let mut allow = Mapping::new();
        allow.insert(
            "exit_codes".into(),
            Value::Sequence(codes.iter().map(|c| (*c).into()).collect()),
        );
        self.job.insert("allow_failure".into(), Value::Mapping(allow));
        self
    }

    pub fn extends(mut self, parent: &str) -> Self {
        self.job.insert("extends".into(), parent.into());
        self
    }

    pub fn rule(mut self, if_expr: Option<&str>, when: Option<&str>) -> Self {
        let mut rule = Mapping::new();
        if let Some(expr) = if_expr {
            rule.insert("if".into(), expr.into());
        }
        if let Some(when) = when {
            rule.insert("when".into(), when.into());
        }
        let entry = self
            .job
            .entry("rules".into())
            .or_insert_with(|| Value::Sequence(Vec::new()));
        if let Value::Sequence(rules) = entry {
            rules.push(Value::Mapping(rule));
        }
        self
    }

    pub fn variable(mut self, key: &str, value: &str) -> Self {
        let entry = self
            .job
            .entry("variables".into())
            .or_insert_with(|| Value::Mapping(Mapping::new()));
        if let Value::Mapping(vars) = entry {
            vars.insert(key.into(), value.into());
        }
        self
    }

    pub fn artifacts(mut self, path: &str) -> Self {
        let mut artifacts = Mapping::new();
        artifacts.insert("paths".into(), Value::Sequence(vec![path.into()]));
        self.job.insert("artifacts".into(), Value::Mapping(artifacts));
        self
    }

    pub fn parallel(mut self, count: u32) -> Self {
        self.job.insert("parallel".into(), count.into());
        self
    }

    pub fn build(self) -> Mapping {
        self.job
    }
}
