// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LocalCiError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Rule expression error: {0}")]
    RuleExpressionError(String),

    #[error("Scheduling invariant violated: {0}")]
    SchedulingInvariantError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LocalCiError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        LocalCiError::ConfigError(msg.into())
    }

    pub(crate) fn rule(msg: impl Into<String>) -> Self {
        LocalCiError::RuleExpressionError(msg.into())
    }

    pub(crate) fn scheduling(msg: impl Into<String>) -> Self {
        LocalCiError::SchedulingInvariantError(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, LocalCiError>;
