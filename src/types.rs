use std::fmt;

use serde::Deserialize;

/// Activation policy of a job, from `when:` or from the matching rule.
///
/// - `OnSuccess`: run once everything it waits on finished without failure
///   (default).
/// - `OnFailure`: run only if something it waits on failed.
/// - `Always`: run once everything it waits on is finished, whatever the
///   outcome.
/// - `Manual`: run only when explicitly selected for this pipeline.
/// - `Never`: do not run.
/// - `Delayed`: accepted for compatibility; behaves like `OnSuccess` locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum When {
    OnSuccess,
    OnFailure,
    Always,
    Manual,
    Never,
    Delayed,
}

impl Default for When {
    fn default() -> Self {
        When::OnSuccess
    }
}

impl When {
    /// `Delayed` collapses into `OnSuccess`; everything else is unchanged.
    pub fn normalized(self) -> Self {
        match self {
            When::Delayed => When::OnSuccess,
            other => other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            When::OnSuccess => "on_success",
            When::OnFailure => "on_failure",
            When::Always => "always",
            When::Manual => "manual",
            When::Never => "never",
            When::Delayed => "delayed",
        }
    }
}

impl fmt::Display for When {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
