// src/exec/mod.rs

//! Job execution layer.
//!
//! - [`backend`] provides the `JobRunner` trait and the `ShellJobRunner`
//!   the runtime uses in production, and which tests replace with a fake.
//! - [`job_runner`] runs one job's scripts through the host shell and
//!   reports its exit code back to the runtime.

pub mod backend;
pub mod job_runner;

pub use backend::{JobRunner, ShellJobRunner};
