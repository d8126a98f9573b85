// src/config/validate.rs

use std::collections::HashSet;

use tracing::debug;

use crate::config::job::ResolvedPipeline;
use crate::errors::{LocalCiError, Result};

/// Validate a resolved pipeline and drop the `needs` entries that cannot be
/// waited on (optional needs of jobs that do not exist).
///
/// Checks:
/// - there is at least one job;
/// - every job has a `script` (or is a trigger job);
/// - every job's stage is declared;
/// - every unqualified, non-optional need names an existing job other than
///   the job itself;
/// - `dependencies` name existing jobs and, when `needs` is present, only
///   jobs listed in `needs`.
pub fn validate_pipeline(pipeline: &mut ResolvedPipeline) -> Result<()> {
    if pipeline.jobs.is_empty() {
        return Err(LocalCiError::config(
            "the pipeline defines no jobs (hidden `.name` jobs are templates only)",
        ));
    }

    let names: HashSet<String> = pipeline.jobs.keys().cloned().collect();
    let stage_names: Vec<String> = pipeline.stages.iter().map(|s| s.name.clone()).collect();

    for (name, job) in pipeline.jobs.iter_mut() {
        if job.script.is_empty() && !job.is_trigger() {
            return Err(LocalCiError::config(format!(
                "{name}: job must define a non-empty `script` or a `trigger`"
            )));
        }

        if !stage_names.contains(&job.stage) {
            return Err(LocalCiError::config(format!(
                "{name}: chosen stage '{}' does not exist; available stages are {}",
                job.stage,
                stage_names.join(", ")
            )));
        }

        if let Some(needs) = job.needs.as_mut() {
            let mut kept = Vec::with_capacity(needs.len());
            for need in needs.drain(..) {
                if need.is_qualified() {
                    kept.push(need);
                    continue;
                }
                if need.job == *name {
                    return Err(LocalCiError::config(format!("{name}: a job cannot need itself")));
                }
                if !names.contains(&need.job) {
                    if need.optional {
                        debug!(job = %name, need = %need.job, "dropping optional need on a missing job");
                        continue;
                    }
                    return Err(LocalCiError::config(format!(
                        "{name}: `needs` references undefined job '{}'",
                        need.job
                    )));
                }
                kept.push(need);
            }
            *needs = kept;
        }

        if let Some(dependencies) = &job.dependencies {
            for dep in dependencies {
                if !names.contains(dep) {
                    return Err(LocalCiError::config(format!(
                        "{name}: `dependencies` references undefined job '{dep}'"
                    )));
                }
                if let Some(needs) = &job.needs
                    && !needs.iter().any(|n| n.job == *dep && !n.is_qualified())
                {
                    return Err(LocalCiError::config(format!(
                        "{name}: dependency '{dep}' must also be listed in `needs`"
                    )));
                }
            }
        }
    }

    Ok(())
}
