// src/config/mod.rs

//! Pipeline configuration: from YAML text to a [`ResolvedPipeline`].
//!
//! Responsibilities:
//! - Typed model of the YAML (`model.rs`) and the resolved form (`job.rs`).
//! - Loading and multi-document merge (`loader.rs`).
//! - `include`, `!reference`, `extends` and `parallel` expansion.
//! - Orchestration of all phases (`resolve.rs`) and validation (`validate.rs`).
//! - Tool settings from `.localci.toml` (`settings.rs`).

pub mod extends;
pub mod include;
pub mod job;
pub mod loader;
pub mod merge;
pub mod model;
pub mod parallel;
pub mod reference;
pub mod resolve;
pub mod settings;
pub mod validate;

pub use include::{FsIncludeFetcher, IncludeFetcher, IncludeSource};
pub use job::{JobSpec, ResolvedPipeline, Stage, WorkflowOutcome};
pub use loader::{load_pipeline, parse_documents};
pub use resolve::{resolve, ResolveOptions};
pub use settings::{load_settings, SettingsFile, SettingsSection};
pub use validate::validate_pipeline;
