// src/config/resolve.rs

//! Turn parsed YAML documents into a [`ResolvedPipeline`].
//!
//! Phases, in order:
//!
//! 1. merge the documents of the stream
//! 2. expand `include:`
//! 3. expand `!reference`
//! 4. split the root into globals and typed job definitions
//! 5. resolve `extends`
//! 6. apply `default:` (and legacy top-level defaults), honouring `inherit`
//! 7. fan out `parallel`
//! 8. evaluate `workflow:rules` and each job's `rules`
//! 9. validate
//!
//! Resolution is deterministic: the same input always yields the same
//! pipeline, in the same order.

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_yaml::{Mapping, Value};
use tracing::{debug, info, warn};

use crate::config::extends::resolve_extends;
use crate::config::include::{expand_includes, IncludeFetcher};
use crate::config::job::{
    JobSpec, ResolvedPipeline, Stage, WorkflowOutcome, DEFAULT_JOB_STAGE, DEFAULT_STAGES,
    POST_STAGE, PRE_STAGE,
};
use crate::config::loader::merge_documents;
use crate::config::merge::Merge;
use crate::config::model::{
    AllowFailure, DefaultSpec, Inherit, OneOrMany, RawJob, ScriptLines, VariableValue,
    WorkflowSpec, ILLEGAL_JOB_NAMES, RESERVED_KEYWORDS,
};
use crate::config::parallel::{expand_parallel, fan_out_names, fan_out_needs, ParallelMember};
use crate::config::reference::expand_references;
use crate::config::validate::validate_pipeline;
use crate::errors::{LocalCiError, Result};
use crate::rules::select_rule;
use crate::types::When;
use crate::variables::{
    expand_environment, expand_text, layer_environment, Environment, VariableSource,
};

/// Top-level keys that `default:` can also be given through (legacy form).
const LEGACY_DEFAULT_KEYS: &[&str] = &["image", "services", "cache", "before_script", "after_script"];

/// Inputs of a resolution that do not come from the YAML itself.
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// Predefined variables (highest precedence).
    pub predefined: Environment,
    /// Variables given on the command line or in the settings file.
    pub cli: Environment,
    /// Names a visible job may not use.
    pub illegal_names: Vec<String>,
    pub pipeline_iid: u64,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            predefined: Environment::new(),
            cli: Environment::new(),
            illegal_names: ILLEGAL_JOB_NAMES.iter().map(|s| s.to_string()).collect(),
            pipeline_iid: 1,
        }
    }
}

impl ResolveOptions {
    pub fn from_source(source: &dyn VariableSource) -> Self {
        Self {
            predefined: source.predefined(),
            cli: source.cli(),
            ..Self::default()
        }
    }

    pub fn with_pipeline_iid(mut self, pipeline_iid: u64) -> Self {
        self.pipeline_iid = pipeline_iid;
        self
    }

    /// Predefined layer including the pipeline id.
    fn predefined_layer(&self) -> Environment {
        let mut env = self.predefined.clone();
        env.insert("CI_PIPELINE_IID".to_string(), self.pipeline_iid.to_string());
        env
    }
}

/// Resolve the documents of one YAML stream.
pub fn resolve(
    documents: Vec<Value>,
    fetcher: &dyn IncludeFetcher,
    options: &ResolveOptions,
) -> Result<ResolvedPipeline> {
    let root = merge_documents(documents)?;

    let include_env = pipeline_environment(&root_variables(&root), options);
    let root = expand_includes(root, fetcher, &include_env)?;
    let root = expand_references(root)?;

    let Value::Mapping(root) = root else {
        return Err(LocalCiError::config("the configuration root must be a mapping"));
    };

    let top = TopLevel::split(root, options)?;
    let stages = parse_stages(top.stages)?;
    let mut globals = variables_text(&top.variables);
    let workflow = evaluate_workflow(top.workflow.as_ref(), &mut globals, options)?;

    let jobs = resolve_extends(&top.jobs)?;

    let mut expanded = Vec::new();
    let mut members_of: IndexMap<String, Vec<String>> = IndexMap::new();
    for (name, job) in jobs {
        if is_hidden(&name) {
            continue;
        }
        let job = apply_defaults(job, &top.defaults);
        let members = expand_parallel(&name, job.parallel.as_ref())?;
        members_of.insert(name, members.iter().map(|m| m.name.clone()).collect());
        expanded.push((members, job));
    }

    let mut resolved: IndexMap<String, JobSpec> = IndexMap::new();
    for (members, raw) in expanded {
        for member in members {
            let spec = build_job(member, &raw, &globals, &members_of, options)?;
            if resolved.contains_key(&spec.name) {
                return Err(LocalCiError::config(format!(
                    "{}: job name is produced more than once",
                    spec.name
                )));
            }
            debug!(job = %spec.name, stage = %spec.stage, when = %spec.when, "resolved job");
            resolved.insert(spec.name.clone(), spec);
        }
    }

    let mut pipeline = ResolvedPipeline {
        stages,
        jobs: resolved,
        variables: globals,
        workflow,
    };
    validate_pipeline(&mut pipeline)?;

    info!(
        jobs = pipeline.jobs.len(),
        stages = pipeline.stages.len(),
        run = pipeline.workflow.run,
        "resolved pipeline"
    );
    Ok(pipeline)
}

/// The root mapping split into globals and job definitions.
struct TopLevel {
    stages: Option<Value>,
    variables: IndexMap<String, VariableValue>,
    /// `default:` merged over the legacy top-level keys.
    defaults: DefaultSpec,
    workflow: Option<WorkflowSpec>,
    /// Every job definition, hidden templates included, in declaration order.
    jobs: IndexMap<String, RawJob>,
}

impl TopLevel {
    fn split(root: Mapping, options: &ResolveOptions) -> Result<Self> {
        let mut top = TopLevel {
            stages: None,
            variables: IndexMap::new(),
            defaults: DefaultSpec::default(),
            workflow: None,
            jobs: IndexMap::new(),
        };
        let mut legacy = Mapping::new();
        let mut default_block = None;

        for (key, value) in root {
            let name = key_name(&key).ok_or_else(|| {
                LocalCiError::config(format!("top-level key {key:?} is not a string"))
            })?;

            match name.as_str() {
                "stages" => top.stages = Some(value),
                "variables" => {
                    if !value.is_null() {
                        top.variables = parse_typed("variables", value)?;
                    }
                }
                "default" => {
                    check_cache_shape("default", &value)?;
                    if !value.is_null() {
                        default_block = Some(parse_typed::<DefaultSpec>("default", value)?);
                    }
                }
                "workflow" => {
                    if !value.is_null() {
                        top.workflow = Some(parse_typed("workflow", value)?);
                    }
                }
                key if LEGACY_DEFAULT_KEYS.contains(&key) => {
                    legacy.insert(Value::String(name.clone()), value);
                }
                "types" => warn!("`types` is not supported, use `stages`"),
                key if RESERVED_KEYWORDS.contains(&key) => {}
                _ => {
                    if let Some(job) = parse_job(&name, value, options)? {
                        top.jobs.insert(name.clone(), job);
                    }
                }
            }
        }

        // `default:` wins over the legacy top-level keys.
        let legacy = Value::Mapping(legacy);
        check_cache_shape("top-level", &legacy)?;
        top.defaults = parse_typed("top-level", legacy)?;
        if let Some(default_block) = default_block {
            top.defaults.merge(default_block);
        }

        Ok(top)
    }
}

fn parse_job(name: &str, value: Value, options: &ResolveOptions) -> Result<Option<RawJob>> {
    if is_hidden(name) {
        // Hidden keys also hold plain anchors (`.paths: &paths [...]`).
        if !value.is_mapping() {
            return Ok(None);
        }
    } else {
        if options.illegal_names.iter().any(|n| n == name) {
            return Err(LocalCiError::config(format!(
                "{name}: job name is reserved and cannot be used"
            )));
        }
        if !value.is_mapping() {
            return Err(LocalCiError::config(format!(
                "{name}: job config should be a mapping"
            )));
        }
    }

    check_cache_shape(name, &value)?;
    parse_typed(name, value).map(Some)
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

fn key_name(key: &Value) -> Option<String> {
    match key {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Deserialize `value`; on failure, name the offending field of `owner`.
fn parse_typed<T: DeserializeOwned>(owner: &str, value: Value) -> Result<T> {
    match serde_yaml::from_value::<T>(value.clone()) {
        Ok(parsed) => Ok(parsed),
        Err(err) => {
            if let Value::Mapping(map) = value {
                for (key, field) in map {
                    let mut single = Mapping::new();
                    single.insert(key.clone(), field);
                    if let Err(field_err) = serde_yaml::from_value::<T>(Value::Mapping(single)) {
                        let field = key_name(&key).unwrap_or_else(|| format!("{key:?}"));
                        return Err(LocalCiError::config(format!(
                            "{owner}: invalid `{field}`: {field_err}"
                        )));
                    }
                }
            }
            Err(LocalCiError::config(format!("{owner}: {err}")))
        }
    }
}

/// `cache:` must be a mapping or a list of mappings.
fn check_cache_shape(owner: &str, block: &Value) -> Result<()> {
    let Some(cache) = block.get("cache") else {
        return Ok(());
    };
    let valid = match cache {
        Value::Null | Value::Mapping(_) => true,
        Value::Sequence(items) => items.iter().all(Value::is_mapping),
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(LocalCiError::config(format!(
            "{owner}: `cache` must be a mapping or a list of mappings"
        )))
    }
}

/// Lenient read of the root `variables:` used for include rules, before
/// the configuration is fully parsed.
fn root_variables(root: &Value) -> Environment {
    root.get("variables")
        .cloned()
        .and_then(|v| serde_yaml::from_value::<IndexMap<String, VariableValue>>(v).ok())
        .map(|vars| variables_text(&vars))
        .unwrap_or_default()
}

fn variables_text(vars: &IndexMap<String, VariableValue>) -> Environment {
    vars.iter().map(|(k, v)| (k.clone(), v.as_text())).collect()
}

fn pipeline_environment(globals: &Environment, options: &ResolveOptions) -> Environment {
    let predefined = options.predefined_layer();
    expand_environment(&layer_environment(&[globals, &options.cli, &predefined]))
}

/// Parse `stages:`; `.pre` and `.post` always frame the list.
fn parse_stages(value: Option<Value>) -> Result<Vec<Stage>> {
    let declared: Vec<String> = match value {
        None | Some(Value::Null) => DEFAULT_STAGES.iter().map(|s| s.to_string()).collect(),
        Some(Value::Sequence(items)) => {
            let mut names = Vec::with_capacity(items.len());
            collect_stage_names(items, &mut names)?;
            names
        }
        Some(_) => return Err(LocalCiError::config("`stages` must be an array")),
    };

    let mut names = vec![PRE_STAGE.to_string()];
    for name in declared {
        if name == PRE_STAGE || name == POST_STAGE || names.contains(&name) {
            continue;
        }
        names.push(name);
    }
    names.push(POST_STAGE.to_string());

    Ok(names
        .into_iter()
        .enumerate()
        .map(|(index, name)| Stage { name, index })
        .collect())
}

fn collect_stage_names(items: Vec<Value>, out: &mut Vec<String>) -> Result<()> {
    for item in items {
        match item {
            Value::String(s) => out.push(s),
            Value::Sequence(nested) => collect_stage_names(nested, out)?,
            other => {
                return Err(LocalCiError::config(format!(
                    "`stages` entries must be strings, got {other:?}"
                )));
            }
        }
    }
    Ok(())
}

fn evaluate_workflow(
    workflow: Option<&WorkflowSpec>,
    globals: &mut Environment,
    options: &ResolveOptions,
) -> Result<WorkflowOutcome> {
    let Some(workflow) = workflow else {
        return Ok(WorkflowOutcome::default());
    };

    let mut run = true;
    if let Some(rules) = &workflow.rules {
        let env = pipeline_environment(globals, options);
        let outcome =
            select_rule(rules, &env, When::Always).map_err(|e| within("workflow", e))?;
        run = outcome.when != When::Never;
        globals.extend(outcome.variables);
    }

    let env = pipeline_environment(globals, options);
    let name = workflow.name.as_deref().map(|n| expand_text(n, &env));
    if !run {
        info!("workflow rules prevent this pipeline from running");
    }
    Ok(WorkflowOutcome { run, name })
}

/// Fill unset job fields from the defaults the job inherits.
fn apply_defaults(mut job: RawJob, defaults: &DefaultSpec) -> RawJob {
    let inherit = job.inherit.clone().unwrap_or_default();

    inherit_field(&mut job.image, &defaults.image, "image", &inherit);
    inherit_field(&mut job.services, &defaults.services, "services", &inherit);
    inherit_field(&mut job.cache, &defaults.cache, "cache", &inherit);
    inherit_field(&mut job.artifacts, &defaults.artifacts, "artifacts", &inherit);
    inherit_field(&mut job.before_script, &defaults.before_script, "before_script", &inherit);
    inherit_field(&mut job.after_script, &defaults.after_script, "after_script", &inherit);
    inherit_field(&mut job.tags, &defaults.tags, "tags", &inherit);
    inherit_field(&mut job.interruptible, &defaults.interruptible, "interruptible", &inherit);
    inherit_field(&mut job.timeout, &defaults.timeout, "timeout", &inherit);

    job
}

fn inherit_field<T: Clone>(field: &mut Option<T>, default: &Option<T>, key: &str, inherit: &Inherit) {
    if field.is_none() && inherit.allows_default(key) {
        field.clone_from(default);
    }
}

fn job_predefined(member: &ParallelMember, stage: &str, options: &ResolveOptions) -> Environment {
    let mut env = options.predefined_layer();
    env.insert("CI_JOB_NAME".to_string(), member.name.clone());
    env.insert("CI_JOB_STAGE".to_string(), stage.to_string());
    if let (Some(index), Some(total)) = (member.node_index, member.node_total) {
        env.insert("CI_NODE_INDEX".to_string(), index.to_string());
        env.insert("CI_NODE_TOTAL".to_string(), total.to_string());
    }
    env
}

fn build_job(
    member: ParallelMember,
    raw: &RawJob,
    globals: &Environment,
    members_of: &IndexMap<String, Vec<String>>,
    options: &ResolveOptions,
) -> Result<JobSpec> {
    let inherit = raw.inherit.clone().unwrap_or_default();
    let stage = raw
        .stage
        .clone()
        .unwrap_or_else(|| DEFAULT_JOB_STAGE.to_string());

    let inherited: Environment = globals
        .iter()
        .filter(|(key, _)| inherit.allows_variable(key))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let own = raw.variables.as_ref().map(variables_text).unwrap_or_default();
    let mut variables = layer_environment(&[&inherited, &own, &member.matrix]);

    let predefined = job_predefined(&member, &stage, options);
    let layered = |vars: &Environment| {
        expand_environment(&layer_environment(&[vars, &options.cli, &predefined]))
    };

    let static_when = raw.when.unwrap_or_default().normalized();
    let (when, allow_failure) = match &raw.rules {
        Some(rules) => {
            let outcome = select_rule(rules, &layered(&variables), static_when)
                .map_err(|e| within(&member.name, e))?;
            variables.extend(outcome.variables);
            (outcome.when, outcome.allow_failure)
        }
        None => (
            static_when,
            raw.allow_failure
                .clone()
                .unwrap_or(AllowFailure::Bool(static_when == When::Manual)),
        ),
    };

    let env = layered(&variables);
    let scripts = |lines: &Option<ScriptLines>| lines.clone().map(ScriptLines::into_vec).unwrap_or_default();

    Ok(JobSpec {
        name: member.name,
        base_name: member.base_name,
        stage,
        before_script: scripts(&raw.before_script),
        script: scripts(&raw.script),
        after_script: scripts(&raw.after_script),
        image: raw.image.clone(),
        services: raw.services.clone().unwrap_or_default(),
        cache: raw.cache.clone().map(OneOrMany::into_vec).unwrap_or_default(),
        artifacts: raw.artifacts.clone(),
        variables,
        env,
        rules: raw.rules.clone().unwrap_or_default(),
        when,
        allow_failure,
        needs: raw.needs.clone().map(|needs| fan_out_needs(needs, members_of)),
        dependencies: raw
            .dependencies
            .clone()
            .map(|deps| fan_out_names(deps, members_of)),
        trigger: raw.trigger.clone(),
        environment: raw.environment.clone(),
        tags: raw.tags.clone().unwrap_or_default(),
        interruptible: raw.interruptible.unwrap_or(false),
        timeout: raw.timeout.clone(),
        node_index: member.node_index,
        node_total: member.node_total,
        matrix: member.matrix,
    })
}

/// Prefix an error with the job (or block) it was raised for.
fn within(owner: &str, err: LocalCiError) -> LocalCiError {
    match err {
        LocalCiError::RuleExpressionError(msg) => LocalCiError::rule(format!("{owner}: {msg}")),
        LocalCiError::ConfigError(msg) => LocalCiError::config(format!("{owner}: {msg}")),
        other => other,
    }
}
