// src/config/reference.rs

//! `!reference [key, path]` expansion.
//!
//! A reference is replaced by the sub-tree found by walking its key path from
//! the document root. References inside the referenced sub-tree are expanded
//! recursively; the chain of paths currently being expanded is kept on a
//! stack so a reference back into that chain is reported as a cycle with its
//! exact path.

use std::borrow::Cow;

use serde_yaml::value::TaggedValue;
use serde_yaml::{Mapping, Sequence, Value};
use tracing::trace;

use crate::errors::{LocalCiError, Result};

const REFERENCE_TAG: &str = "reference";

/// Replace every `!reference` in `root` by its target.
pub fn expand_references(root: Value) -> Result<Value> {
    let expander = ReferenceExpander { root: &root };
    let mut stack = Vec::new();
    expander.expand(&root, &mut stack)
}

struct ReferenceExpander<'a> {
    root: &'a Value,
}

impl ReferenceExpander<'_> {
    fn expand(&self, value: &Value, stack: &mut Vec<String>) -> Result<Value> {
        match value {
            Value::Tagged(tagged) if tagged.tag == REFERENCE_TAG => {
                self.expand_reference(&tagged.value, stack)
            }
            Value::Tagged(tagged) => Ok(Value::Tagged(Box::new(TaggedValue {
                tag: tagged.tag.clone(),
                value: self.expand(&tagged.value, stack)?,
            }))),
            Value::Sequence(items) => {
                let mut out = Sequence::with_capacity(items.len());
                for item in items {
                    let expanded = self.expand(item, stack)?;
                    // A referenced list inside a list is spliced in place.
                    match (is_reference(item), expanded) {
                        (true, Value::Sequence(inner)) => out.extend(inner),
                        (_, other) => out.push(other),
                    }
                }
                Ok(Value::Sequence(out))
            }
            Value::Mapping(map) => {
                let mut out = Mapping::with_capacity(map.len());
                for (key, item) in map {
                    out.insert(key.clone(), self.expand(item, stack)?);
                }
                Ok(Value::Mapping(out))
            }
            other => Ok(other.clone()),
        }
    }

    fn expand_reference(&self, path_value: &Value, stack: &mut Vec<String>) -> Result<Value> {
        let path = reference_path(path_value)?;
        let path_key = path.join(".");

        if let Some(pos) = stack.iter().position(|p| *p == path_key) {
            let mut cycle: Vec<&str> = stack[pos..].iter().map(String::as_str).collect();
            cycle.push(&path_key);
            return Err(LocalCiError::config(format!(
                "circular !reference detected: {}",
                cycle.join(" -> ")
            )));
        }

        trace!(reference = %path_key, "expanding !reference");
        stack.push(path_key);
        let target = self.lookup(&path, stack)?;
        let expanded = self.expand(&target, stack);
        stack.pop();
        expanded
    }

    /// Walk `path` from the root. Intermediate nodes that are themselves
    /// references are expanded on the way; only those and the final target
    /// are copied.
    fn lookup(&self, path: &[String], stack: &mut Vec<String>) -> Result<Value> {
        let mut current: Cow<'_, Value> = Cow::Borrowed(self.root);

        for (depth, segment) in path.iter().enumerate() {
            if is_reference(&current) {
                current = Cow::Owned(self.expand(&current, stack)?);
            }
            current = match current {
                Cow::Borrowed(value) => Cow::Borrowed(child(value, path, depth)?),
                Cow::Owned(value) => Cow::Owned(child(&value, path, depth)?.clone()),
            };
        }

        Ok(current.into_owned())
    }
}

/// The entry `path[depth]` of the mapping `value`.
fn child<'v>(value: &'v Value, path: &[String], depth: usize) -> Result<&'v Value> {
    let Value::Mapping(map) = value else {
        return Err(LocalCiError::config(format!(
            "!reference [{}]: '{}' is not a mapping",
            path.join(", "),
            path[..depth].join(".")
        )));
    };
    map.get(path[depth].as_str()).ok_or_else(|| {
        LocalCiError::config(format!(
            "!reference [{}]: key '{}' could not be found",
            path.join(", "),
            path[..=depth].join(".")
        ))
    })
}

fn is_reference(value: &Value) -> bool {
    matches!(value, Value::Tagged(tagged) if tagged.tag == REFERENCE_TAG)
}

fn reference_path(value: &Value) -> Result<Vec<String>> {
    let Value::Sequence(items) = value else {
        return Err(LocalCiError::config(
            "!reference must be followed by a list of keys, e.g. !reference [.setup, script]",
        ));
    };

    if items.is_empty() {
        return Err(LocalCiError::config("!reference with an empty key path"));
    }

    items
        .iter()
        .map(|item| match item {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(LocalCiError::config(format!(
                "!reference keys must be strings, got {other:?}"
            ))),
        })
        .collect()
}
