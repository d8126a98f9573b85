use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use localci::config::{IncludeFetcher, IncludeSource};

/// In-memory `IncludeFetcher`.
///
/// Documents are registered per source; anything else fails to fetch.
/// Every fetch is recorded so tests can check what was (not) included.
#[derive(Debug, Clone, Default)]
pub struct MapFetcher {
    documents: HashMap<IncludeSource, String>,
    fetched: Arc<Mutex<Vec<IncludeSource>>>,
}

impl MapFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn local(mut self, path: &str, text: &str) -> Self {
        self.documents.insert(
            IncludeSource::Local {
                path: path.to_string(),
            },
            text.to_string(),
        );
        self
    }

    pub fn remote(mut self, url: &str, text: &str) -> Self {
        self.documents.insert(
            IncludeSource::Remote {
                url: url.to_string(),
            },
            text.to_string(),
        );
        self
    }

    pub fn template(mut self, name: &str, text: &str) -> Self {
        self.documents.insert(
            IncludeSource::Template {
                name: name.to_string(),
            },
            text.to_string(),
        );
        self
    }

    pub fn project(mut self, project: &str, git_ref: &str, file: &str, text: &str) -> Self {
        self.documents.insert(
            IncludeSource::Project {
                project: project.to_string(),
                git_ref: git_ref.to_string(),
                file: file.to_string(),
            },
            text.to_string(),
        );
        self
    }

    /// Sources fetched so far, in order.
    pub fn fetched(&self) -> Vec<IncludeSource> {
        self.fetched.lock().unwrap().clone()
    }
}

impl IncludeFetcher for MapFetcher {
    fn fetch(&self, source: &IncludeSource) -> anyhow::Result<String> {
        self.fetched.lock().unwrap().push(source.clone());
        self.documents
            .get(source)
            .cloned()
            .ok_or_else(|| anyhow!("no document registered for {source}"))
    }
}
