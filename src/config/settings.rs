// src/config/settings.rs

//! Tool settings from an optional `.localci.toml`.
//!
//! ```toml
//! [settings]
//! concurrency = 4
//! poll_interval_ms = 200
//! shutdown_grace_ms = 5000
//! shell = "sh"
//!
//! [variables]
//! DEPLOY_ENV = "local"
//! ```
//!
//! Every section is optional. CLI flags override these values.

use std::fs;
use std::path::Path;
use std::time::Duration;

use indexmap::IndexMap;
use serde::Deserialize;
use tracing::debug;

use crate::errors::{LocalCiError, Result};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsFile {
    #[serde(default)]
    pub settings: SettingsSection,

    /// Extra variables, layered below `--variable` flags.
    #[serde(default)]
    pub variables: IndexMap<String, String>,
}

/// `[settings]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SettingsSection {
    /// Maximum number of jobs running at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Upper bound between two scheduling passes when no event arrives.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How long running jobs get to finish after a shutdown request.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,

    /// Shell used to run job scripts (`<shell> -c <script>`).
    #[serde(default = "default_shell")]
    pub shell: String,
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(usize::from)
        .unwrap_or(4)
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn default_shutdown_grace_ms() -> u64 {
    10_000
}

fn default_shell() -> String {
    "sh".to_string()
}

impl Default for SettingsSection {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            poll_interval_ms: default_poll_interval_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            shell: default_shell(),
        }
    }
}

impl SettingsSection {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Parse and validate settings text.
pub fn parse_settings(text: &str) -> Result<SettingsFile> {
    let file: SettingsFile = toml::from_str(text)?;
    validate_settings(&file)?;
    Ok(file)
}

/// Load settings from `path`, falling back to defaults when the file does
/// not exist.
pub fn load_settings(path: impl AsRef<Path>) -> Result<SettingsFile> {
    let path = path.as_ref();
    if !path.exists() {
        debug!(path = %path.display(), "no settings file, using defaults");
        return Ok(SettingsFile::default());
    }

    let contents = fs::read_to_string(path)?;
    debug!(path = %path.display(), "loaded settings file");
    parse_settings(&contents)
}

fn validate_settings(file: &SettingsFile) -> Result<()> {
    let s = &file.settings;
    if s.concurrency == 0 {
        return Err(LocalCiError::config(
            "settings.concurrency must be at least 1",
        ));
    }
    if s.poll_interval_ms == 0 {
        return Err(LocalCiError::config(
            "settings.poll_interval_ms must be at least 1",
        ));
    }
    if s.shell.trim().is_empty() {
        return Err(LocalCiError::config("settings.shell must not be empty"));
    }
    Ok(())
}
