// src/config/include.rs

//! `include:` expansion.
//!
//! Included documents are fetched through an [`IncludeFetcher`], have their
//! own includes expanded first, and are then deep-merged:
//!
//! - includes are merged in declaration order, a later include overriding an
//!   earlier one;
//! - the including document's own keys override everything it includes.
//!
//! A local include found inside a project include is fetched from the same
//! project and ref; inside a remote include it is resolved against the
//! remote URL.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use globset::GlobBuilder;
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use tracing::{debug, info};
use url::Url;

use crate::config::loader::parse_root;
use crate::config::merge::deep_merge;
use crate::config::model::{OneOrMany, RuleSpec};
use crate::errors::{LocalCiError, Result};
use crate::fs::FileSystem;
use crate::rules::select_rule;
use crate::types::When;
use crate::variables::{expand_text, Environment};

/// Include nesting at or beyond this depth is reported as circular.
pub const MAX_INCLUDE_DEPTH: usize = 100;

/// Where an included document comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IncludeSource {
    Local {
        path: String,
    },
    Remote {
        url: String,
    },
    Template {
        name: String,
    },
    Project {
        project: String,
        git_ref: String,
        file: String,
    },
}

impl fmt::Display for IncludeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IncludeSource::Local { path } => write!(f, "local '{path}'"),
            IncludeSource::Remote { url } => write!(f, "remote '{url}'"),
            IncludeSource::Template { name } => write!(f, "template '{name}'"),
            IncludeSource::Project {
                project,
                git_ref,
                file,
            } => write!(f, "project '{project}' ref '{git_ref}' file '{file}'"),
        }
    }
}

/// Fetches the text of included documents.
pub trait IncludeFetcher {
    fn fetch(&self, source: &IncludeSource) -> anyhow::Result<String>;

    /// Expand a local include pattern (`ci/*.yml`) into concrete paths.
    ///
    /// The default implementation treats every pattern as a literal path.
    fn expand_local(&self, pattern: &str) -> anyhow::Result<Vec<String>> {
        Ok(vec![pattern.to_string()])
    }
}

/// Reads includes from a project checkout.
///
/// - local files relative to `root`
/// - templates from `<root>/.localci/templates/<name>`
/// - project files from `<root>/.localci/includes/<project>/<ref>/<file>`
/// - remote files from `<root>/.localci/includes/remote/<host>/<path>`
#[derive(Debug, Clone)]
pub struct FsIncludeFetcher {
    fs: Arc<dyn FileSystem>,
    root: PathBuf,
}

impl FsIncludeFetcher {
    pub fn new(fs: Arc<dyn FileSystem>, root: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            root: root.into(),
        }
    }

    fn path_for(&self, source: &IncludeSource) -> anyhow::Result<PathBuf> {
        let cache = self.root.join(".localci");
        Ok(match source {
            IncludeSource::Local { path } => self.root.join(path.trim_start_matches('/')),
            IncludeSource::Template { name } => cache.join("templates").join(name),
            IncludeSource::Project {
                project,
                git_ref,
                file,
            } => cache
                .join("includes")
                .join(project)
                .join(git_ref)
                .join(file.trim_start_matches('/')),
            IncludeSource::Remote { url } => {
                let parsed = Url::parse(url).with_context(|| format!("invalid URL {url}"))?;
                let host = parsed
                    .host_str()
                    .ok_or_else(|| anyhow!("URL {url} has no host"))?;
                cache
                    .join("includes")
                    .join("remote")
                    .join(host)
                    .join(parsed.path().trim_start_matches('/'))
            }
        })
    }
}

impl IncludeFetcher for FsIncludeFetcher {
    fn fetch(&self, source: &IncludeSource) -> anyhow::Result<String> {
        let path = self.path_for(source)?;
        if !self.fs.exists(&path) {
            return Err(anyhow!("{} does not exist", path.display()));
        }
        self.fs.read_to_string(&path)
    }

    fn expand_local(&self, pattern: &str) -> anyhow::Result<Vec<String>> {
        let pattern = pattern.trim_start_matches('/');
        if !pattern.contains(['*', '?', '[']) {
            return Ok(vec![pattern.to_string()]);
        }

        let matcher = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .with_context(|| format!("invalid include pattern: {pattern}"))?
            .compile_matcher();

        let files = self.fs.files_under(&self.root)?;

        let mut matches: Vec<String> = files
            .iter()
            .filter_map(|path| path.strip_prefix(&self.root).ok())
            .map(|rel| rel.to_string_lossy().replace('\\', "/"))
            .filter(|rel| !rel.starts_with(".localci/") && matcher.is_match(rel))
            .collect();
        matches.sort();
        Ok(matches)
    }
}

/// The context an include is expanded in; decides how nested local
/// includes are rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncludeOrigin {
    Root,
    Project { project: String, git_ref: String },
    Remote { url: String },
}

/// One parsed entry of `include:`.
#[derive(Debug, Clone)]
struct IncludeEntry {
    sources: Vec<IncludeSource>,
    rules: Option<Vec<RuleSpec>>,
    /// Local entries may be glob patterns.
    local_pattern: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IncludeRepr {
    Path(String),
    Local {
        local: String,
        #[serde(default)]
        rules: Option<Vec<RuleSpec>>,
    },
    Remote {
        remote: String,
        #[serde(default)]
        rules: Option<Vec<RuleSpec>>,
    },
    Template {
        template: String,
        #[serde(default)]
        rules: Option<Vec<RuleSpec>>,
    },
    Project {
        project: String,
        #[serde(default, rename = "ref")]
        git_ref: Option<String>,
        file: OneOrMany<String>,
        #[serde(default)]
        rules: Option<Vec<RuleSpec>>,
    },
}

/// Expand all includes of `document` recursively.
pub fn expand_includes(
    document: Value,
    fetcher: &dyn IncludeFetcher,
    env: &Environment,
) -> Result<Value> {
    expand_at_depth(document, fetcher, env, &IncludeOrigin::Root, 0)
}

fn expand_at_depth(
    document: Value,
    fetcher: &dyn IncludeFetcher,
    env: &Environment,
    origin: &IncludeOrigin,
    depth: usize,
) -> Result<Value> {
    let Value::Mapping(mut own) = document else {
        return Ok(document);
    };

    let Some(include) = own.shift_remove("include") else {
        return Ok(Value::Mapping(own));
    };

    if depth >= MAX_INCLUDE_DEPTH {
        return Err(LocalCiError::config(format!(
            "circular include detected: nesting depth reached {MAX_INCLUDE_DEPTH}"
        )));
    }

    let mut merged = Value::Mapping(Mapping::new());

    for entry in parse_entries(include, env)? {
        if !entry_applies(&entry, env)? {
            debug!(sources = ?entry.sources, "include skipped by its rules");
            continue;
        }

        for source in concrete_sources(&entry, origin, fetcher)? {
            let text = fetcher.fetch(&source).map_err(|e| {
                LocalCiError::config(format!("include {source} could not be fetched: {e:#}"))
            })?;
            info!(%source, depth, "including document");

            let included = parse_root(&text)?;
            let child_origin = origin_of(&source, origin);
            let included = expand_at_depth(included, fetcher, env, &child_origin, depth + 1)?;
            deep_merge(&mut merged, included);
        }
    }

    deep_merge(&mut merged, Value::Mapping(own));
    Ok(merged)
}

fn parse_entries(include: Value, env: &Environment) -> Result<Vec<IncludeEntry>> {
    let items = match include {
        Value::Sequence(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    };

    items
        .into_iter()
        .map(|item| {
            let repr: IncludeRepr = serde_yaml::from_value(item).map_err(|e| {
                LocalCiError::config(format!("malformed include entry: {e}"))
            })?;
            Ok(entry_from_repr(repr, env))
        })
        .collect()
}

fn entry_from_repr(repr: IncludeRepr, env: &Environment) -> IncludeEntry {
    let expand = |s: &str| expand_text(s, env);

    match repr {
        IncludeRepr::Path(path) => {
            let path = expand(&path);
            if path.starts_with("http://") || path.starts_with("https://") {
                IncludeEntry {
                    sources: vec![IncludeSource::Remote { url: path }],
                    rules: None,
                    local_pattern: false,
                }
            } else {
                IncludeEntry {
                    sources: vec![IncludeSource::Local { path }],
                    rules: None,
                    local_pattern: true,
                }
            }
        }
        IncludeRepr::Local { local, rules } => IncludeEntry {
            sources: vec![IncludeSource::Local {
                path: expand(&local),
            }],
            rules,
            local_pattern: true,
        },
        IncludeRepr::Remote { remote, rules } => IncludeEntry {
            sources: vec![IncludeSource::Remote {
                url: expand(&remote),
            }],
            rules,
            local_pattern: false,
        },
        IncludeRepr::Template { template, rules } => IncludeEntry {
            sources: vec![IncludeSource::Template { name: template }],
            rules,
            local_pattern: false,
        },
        IncludeRepr::Project {
            project,
            git_ref,
            file,
            rules,
        } => {
            let project = expand(&project);
            let git_ref = git_ref
                .map(|r| expand(&r))
                .unwrap_or_else(|| "HEAD".to_string());
            IncludeEntry {
                sources: file
                    .into_vec()
                    .into_iter()
                    .map(|file| IncludeSource::Project {
                        project: project.clone(),
                        git_ref: git_ref.clone(),
                        file: expand(&file),
                    })
                    .collect(),
                rules,
                local_pattern: false,
            }
        }
    }
}

fn entry_applies(entry: &IncludeEntry, env: &Environment) -> Result<bool> {
    match &entry.rules {
        None => Ok(true),
        Some(rules) => Ok(select_rule(rules, env, When::OnSuccess)?.when != When::Never),
    }
}

/// Turn an entry into fetchable sources: expand local globs and rewrite
/// local paths relative to the origin of the including document.
fn concrete_sources(
    entry: &IncludeEntry,
    origin: &IncludeOrigin,
    fetcher: &dyn IncludeFetcher,
) -> Result<Vec<IncludeSource>> {
    let mut out = Vec::new();

    for source in &entry.sources {
        let IncludeSource::Local { path } = source else {
            out.push(source.clone());
            continue;
        };

        match origin {
            IncludeOrigin::Root => {
                let paths = if entry.local_pattern {
                    fetcher.expand_local(path).map_err(|e| {
                        LocalCiError::config(format!(
                            "include local '{path}' could not be fetched: {e:#}"
                        ))
                    })?
                } else {
                    vec![path.clone()]
                };
                if paths.is_empty() {
                    return Err(LocalCiError::config(format!(
                        "include local '{path}' matched no files"
                    )));
                }
                out.extend(paths.into_iter().map(|path| IncludeSource::Local { path }));
            }
            IncludeOrigin::Project { project, git_ref } => out.push(IncludeSource::Project {
                project: project.clone(),
                git_ref: git_ref.clone(),
                file: path.trim_start_matches('/').to_string(),
            }),
            IncludeOrigin::Remote { url } => {
                let base = Url::parse(url).map_err(|e| {
                    LocalCiError::config(format!("invalid remote include URL '{url}': {e}"))
                })?;
                let joined = base.join(path).map_err(|e| {
                    LocalCiError::config(format!(
                        "cannot resolve local include '{path}' against '{url}': {e}"
                    ))
                })?;
                out.push(IncludeSource::Remote {
                    url: joined.to_string(),
                });
            }
        }
    }

    Ok(out)
}

fn origin_of(source: &IncludeSource, parent: &IncludeOrigin) -> IncludeOrigin {
    match source {
        IncludeSource::Project {
            project, git_ref, ..
        } => IncludeOrigin::Project {
            project: project.clone(),
            git_ref: git_ref.clone(),
        },
        IncludeSource::Remote { url } => IncludeOrigin::Remote { url: url.clone() },
        IncludeSource::Template { .. } => IncludeOrigin::Root,
        IncludeSource::Local { .. } => parent.clone(),
    }
}
