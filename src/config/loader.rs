// src/config/loader.rs

use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_yaml::Value;
use tracing::debug;

use crate::config::include::IncludeFetcher;
use crate::config::job::ResolvedPipeline;
use crate::config::merge::deep_merge;
use crate::config::resolve::{resolve, ResolveOptions};
use crate::errors::{LocalCiError, Result};

/// Parse a YAML stream into its documents.
///
/// YAML merge keys (`<<: *anchor`) are applied to every document.
pub fn parse_documents(text: &str) -> Result<Vec<Value>> {
    let mut documents = Vec::new();
    for document in serde_yaml::Deserializer::from_str(text) {
        let mut value = Value::deserialize(document)?;
        value.apply_merge()?;
        documents.push(value);
    }
    Ok(documents)
}

/// Merge the documents of one stream into a single root mapping.
///
/// Later documents win. A document holding only a `spec:` header describes
/// inputs and contributes no configuration.
pub fn merge_documents(documents: Vec<Value>) -> Result<Value> {
    let mut root = Value::Mapping(Default::default());

    for (idx, document) in documents.into_iter().enumerate() {
        match document {
            Value::Null => continue,
            Value::Mapping(ref map) if map.len() == 1 && map.contains_key("spec") => {
                debug!(document = idx, "skipping `spec:` header document");
                continue;
            }
            Value::Mapping(_) => deep_merge(&mut root, document),
            _ => {
                return Err(LocalCiError::config(format!(
                    "document {idx} of the configuration is not a mapping"
                )));
            }
        }
    }

    Ok(root)
}

/// Parse and merge a YAML stream in one go.
pub fn parse_root(text: &str) -> Result<Value> {
    merge_documents(parse_documents(text)?)
}

/// Load a pipeline file and resolve it.
///
/// This is the recommended entry point for the rest of the application:
///
/// - Reads the YAML stream (several documents allowed).
/// - Expands includes through `fetcher`.
/// - Expands `!reference`, `extends`, defaults, `parallel` and `rules`.
/// - Validates stages, scripts and `needs`.
pub fn load_pipeline(
    path: impl AsRef<Path>,
    fetcher: &dyn IncludeFetcher,
    options: &ResolveOptions,
) -> Result<ResolvedPipeline> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    debug!(path = %path.display(), "loaded pipeline file");
    resolve(parse_documents(&contents)?, fetcher, options)
}
