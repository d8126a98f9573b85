// src/config/parallel.rs

//! `parallel:` fan-out.
//!
//! `parallel: N` yields members `job 1/N` .. `job N/N`. `parallel: matrix:`
//! yields one member per combination of each matrix entry, named after the
//! combination's values (`job: [linux, amd64]`), with the matrix variables
//! attached to the member.

use indexmap::IndexMap;

use crate::config::model::{NeedSpec, OneOrMany, Parallel, ScalarValue};
use crate::errors::{LocalCiError, Result};
use crate::variables::Environment;

pub const MIN_PARALLEL: u32 = 2;
pub const MAX_PARALLEL: u32 = 200;

/// One concrete job produced from a (possibly parallel) definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParallelMember {
    pub name: String,
    pub base_name: String,
    pub node_index: Option<u32>,
    pub node_total: Option<u32>,
    pub matrix: Environment,
}

impl ParallelMember {
    fn single(name: &str) -> Self {
        Self {
            name: name.to_string(),
            base_name: name.to_string(),
            node_index: None,
            node_total: None,
            matrix: Environment::new(),
        }
    }
}

/// Expand the members of job `name`.
pub fn expand_parallel(name: &str, parallel: Option<&Parallel>) -> Result<Vec<ParallelMember>> {
    match parallel {
        None => Ok(vec![ParallelMember::single(name)]),
        Some(Parallel::Count(total)) => expand_count(name, *total),
        Some(Parallel::Matrix { matrix }) => expand_matrix(name, matrix),
    }
}

fn expand_count(name: &str, total: u32) -> Result<Vec<ParallelMember>> {
    if !(MIN_PARALLEL..=MAX_PARALLEL).contains(&total) {
        return Err(LocalCiError::config(format!(
            "{name}: parallel must be a number between {MIN_PARALLEL} and {MAX_PARALLEL}, got {total}"
        )));
    }

    Ok((1..=total)
        .map(|index| ParallelMember {
            name: format!("{name} {index}/{total}"),
            base_name: name.to_string(),
            node_index: Some(index),
            node_total: Some(total),
            matrix: Environment::new(),
        })
        .collect())
}

fn expand_matrix(
    name: &str,
    matrix: &[IndexMap<String, OneOrMany<ScalarValue>>],
) -> Result<Vec<ParallelMember>> {
    if matrix.is_empty() {
        return Err(LocalCiError::config(format!(
            "{name}: parallel:matrix must contain at least one entry"
        )));
    }

    let total = matrix_size(name, matrix)?;
    if total > MAX_PARALLEL as usize {
        return Err(LocalCiError::config(format!(
            "{name}: parallel:matrix generates {total} jobs, at most {MAX_PARALLEL} are allowed"
        )));
    }
    let total = total as u32;

    let mut combinations: Vec<Environment> = Vec::with_capacity(total as usize);
    for entry in matrix {
        let mut partial: Vec<Environment> = vec![Environment::new()];
        for (key, values) in entry {
            let values: Vec<String> = values
                .clone()
                .into_vec()
                .iter()
                .map(|v| v.as_text())
                .collect();

            partial = partial
                .into_iter()
                .flat_map(|combo| {
                    values.iter().map(move |value| {
                        let mut next = combo.clone();
                        next.insert(key.clone(), value.clone());
                        next
                    })
                })
                .collect();
        }
        combinations.extend(partial);
    }

    let mut members = Vec::with_capacity(combinations.len());
    for (idx, combo) in combinations.into_iter().enumerate() {
        let values: Vec<&str> = combo.values().map(String::as_str).collect();
        let member_name = format!("{name}: [{}]", values.join(", "));
        if members.iter().any(|m: &ParallelMember| m.name == member_name) {
            return Err(LocalCiError::config(format!(
                "{name}: parallel:matrix produces the job '{member_name}' more than once"
            )));
        }
        members.push(ParallelMember {
            name: member_name,
            base_name: name.to_string(),
            node_index: Some(idx as u32 + 1),
            node_total: Some(total),
            matrix: combo,
        });
    }

    Ok(members)
}

/// Number of members `matrix` expands to, without building them.
///
/// Overflow saturates to `usize::MAX`, which is over any limit.
fn matrix_size(name: &str, matrix: &[IndexMap<String, OneOrMany<ScalarValue>>]) -> Result<usize> {
    let mut total: usize = 0;
    for entry in matrix {
        let mut product: usize = 1;
        for (key, values) in entry {
            let count = match values {
                OneOrMany::One(_) => 1,
                OneOrMany::Many(items) => items.len(),
            };
            if count == 0 {
                return Err(LocalCiError::config(format!(
                    "{name}: parallel:matrix variable '{key}' has no values"
                )));
            }
            product = product.checked_mul(count).unwrap_or(usize::MAX);
        }
        total = total.checked_add(product).unwrap_or(usize::MAX);
    }
    Ok(total)
}

/// Rewrite `needs` so that a need on a fanned-out job names every member.
///
/// `members` maps a base name to its member names; names not in the map are
/// kept as they are.
pub fn fan_out_needs(needs: Vec<NeedSpec>, members: &IndexMap<String, Vec<String>>) -> Vec<NeedSpec> {
    let mut out = Vec::with_capacity(needs.len());
    for need in needs {
        match members.get(&need.job) {
            Some(names) if !need.is_qualified() && !is_identity(&need.job, names) => {
                out.extend(names.iter().map(|member| NeedSpec {
                    job: member.clone(),
                    ..need.clone()
                }));
            }
            _ => out.push(need),
        }
    }
    out
}

/// Same as [`fan_out_needs`] for `dependencies:` names.
pub fn fan_out_names(names: Vec<String>, members: &IndexMap<String, Vec<String>>) -> Vec<String> {
    let mut out = Vec::with_capacity(names.len());
    for name in names {
        match members.get(&name) {
            Some(expanded) if !is_identity(&name, expanded) => out.extend(expanded.iter().cloned()),
            _ => out.push(name),
        }
    }
    out
}

fn is_identity(name: &str, members: &[String]) -> bool {
    members.len() == 1 && members[0] == name
}
