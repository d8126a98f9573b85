// src/config/extends.rs

//! `extends:` inheritance.
//!
//! Parents are resolved depth-first and merged in declaration order, then
//! the job's own definition is merged on top (see [`Merge`] for the field
//! semantics). Every resolved job is memoised together with the height of
//! its inheritance chain, so shared templates are merged once.

use std::collections::HashMap;

use indexmap::IndexMap;
use tracing::trace;

use crate::config::merge::Merge;
use crate::config::model::{OneOrMany, RawJob};
use crate::errors::{LocalCiError, Result};

/// Chains this deep (or cyclic chains) are rejected.
pub const MAX_EXTENDS_DEPTH: usize = 11;

/// Resolve `extends` for every job (hidden templates included).
///
/// The returned jobs have `extends` cleared and keep their declaration order.
pub fn resolve_extends(jobs: &IndexMap<String, RawJob>) -> Result<IndexMap<String, RawJob>> {
    let mut resolver = ExtendsResolver {
        jobs,
        memo: HashMap::new(),
    };

    let mut resolved = IndexMap::with_capacity(jobs.len());
    for name in jobs.keys() {
        let (job, _) = resolver.resolve(name, name, 0)?;
        resolved.insert(name.clone(), job);
    }
    Ok(resolved)
}

struct ExtendsResolver<'a> {
    jobs: &'a IndexMap<String, RawJob>,
    /// name -> (merged job, height of its `extends` chain)
    memo: HashMap<String, (RawJob, usize)>,
}

impl ExtendsResolver<'_> {
    fn resolve(&mut self, root: &str, name: &str, depth: usize) -> Result<(RawJob, usize)> {
        if depth >= MAX_EXTENDS_DEPTH {
            return Err(circular(root));
        }

        if let Some((job, height)) = self.memo.get(name) {
            if depth + height >= MAX_EXTENDS_DEPTH {
                return Err(circular(root));
            }
            return Ok((job.clone(), *height));
        }

        let Some(own) = self.jobs.get(name) else {
            return Err(LocalCiError::config(format!("{name}: job is not defined")));
        };

        let parents = own
            .extends
            .clone()
            .map(OneOrMany::into_vec)
            .unwrap_or_default();

        let mut merged = RawJob::default();
        let mut height = 0;

        for parent in &parents {
            if !self.jobs.contains_key(parent) {
                return Err(LocalCiError::config(format!(
                    "{name}: unknown key '{parent}' in `extends`"
                )));
            }
            let (parent_job, parent_height) = self.resolve(root, parent, depth + 1)?;
            height = height.max(parent_height + 1);
            merged.merge(parent_job);
        }

        let mut own = own.clone();
        own.extends = None;
        merged.merge(own);

        trace!(job = name, parents = ?parents, height, "resolved extends");
        self.memo.insert(name.to_string(), (merged.clone(), height));
        Ok((merged, height))
    }
}

fn circular(name: &str) -> LocalCiError {
    LocalCiError::config(format!("{name}: circular dependency detected in `extends`"))
}
