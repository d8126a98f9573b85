// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `localci`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "localci",
    version,
    about = "Run a GitLab-CI style pipeline locally.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the pipeline file, relative to `--cwd`.
    #[arg(long, short = 'f', value_name = "PATH", default_value = ".gitlab-ci.yml")]
    pub file: String,

    /// Project directory (`CI_PROJECT_DIR`). Defaults to the current
    /// directory.
    #[arg(long, value_name = "DIR")]
    pub cwd: Option<String>,

    /// Settings file (TOML), relative to `--cwd`. Missing is fine.
    #[arg(long, value_name = "PATH", default_value = ".localci.toml")]
    pub settings: String,

    /// Maximum number of jobs running at once. Overrides the settings file.
    #[arg(long, short = 'j', value_name = "N")]
    pub concurrency: Option<usize>,

    /// Run this manual job (job name or base name of a parallel job).
    /// Repeatable.
    #[arg(long = "manual", value_name = "JOB")]
    pub manual: Vec<String>,

    /// Set a variable, `KEY=VALUE`. Repeatable; overrides pipeline variables.
    #[arg(long = "variable", short = 'v', value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub variables: Vec<(String, String)>,

    /// Pipeline number exposed as `CI_PIPELINE_IID`.
    #[arg(long, value_name = "N", default_value_t = 1)]
    pub pipeline_iid: u64,

    /// Id of the first job; the others are numbered after it.
    #[arg(long, value_name = "N", default_value_t = 1)]
    pub first_job_id: u64,

    /// Resolve the pipeline and list its jobs without running anything.
    #[arg(long)]
    pub list: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `LOCALCI_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
