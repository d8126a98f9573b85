// src/report.rs

//! End-of-run report and plain text listings.

use std::io::{self, Write};

use crate::config::job::ResolvedPipeline;
use crate::dag::{JobStatus, SkipReason};

/// Outcome of one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub job_id: u64,
    pub name: String,
    pub stage: String,
    pub status: JobStatus,
    pub skip_reason: Option<SkipReason>,
    pub allow_failure: bool,
    pub exit_code: Option<i32>,
    /// `environment:` name, when the job deploys to one.
    pub environment: Option<String>,
}

/// Outcome of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    pub pipeline_iid: u64,
    pub succeeded: bool,
    pub cancelled: bool,
    /// Jobs in declaration order.
    pub jobs: Vec<JobReport>,
}

impl PipelineReport {
    pub fn job(&self, name: &str) -> Option<&JobReport> {
        self.jobs.iter().find(|j| j.name == name)
    }

    pub fn status_of(&self, name: &str) -> Option<JobStatus> {
        self.job(name).map(|j| j.status)
    }

    pub fn count(&self, status: JobStatus) -> usize {
        self.jobs.iter().filter(|j| j.status == status).count()
    }
}

/// Print the report to stdout.
pub fn print_report(report: &PipelineReport) {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    // Nothing sensible to do when stdout is gone.
    let _ = write_report(&mut out, report);
}

pub fn write_report(out: &mut impl Write, report: &PipelineReport) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "pipeline #{}", report.pipeline_iid)?;

    let width = report
        .jobs
        .iter()
        .map(|j| j.name.len())
        .max()
        .unwrap_or(0);

    for job in &report.jobs {
        let mut line = format!(
            "  {:<width$}  {:<8}  {}",
            job.name,
            job.status.as_str(),
            job.stage,
            width = width
        );
        if let Some(code) = job.exit_code {
            line.push_str(&format!("  exit {code}"));
        }
        if let Some(reason) = job.skip_reason {
            line.push_str(&format!("  ({reason})"));
        }
        if job.allow_failure && job.status == JobStatus::Warned {
            line.push_str("  [allowed to fail]");
        }
        if let Some(env) = &job.environment {
            line.push_str(&format!("  -> {env}"));
        }
        writeln!(out, "{line}")?;
    }

    let verdict = match (report.succeeded, report.cancelled) {
        (_, true) => "cancelled",
        (true, false) => "passed",
        (false, false) => "failed",
    };
    writeln!(
        out,
        "{verdict}: {} succeeded, {} warned, {} failed, {} skipped",
        report.count(JobStatus::Success),
        report.count(JobStatus::Warned),
        report.count(JobStatus::Failed),
        report.count(JobStatus::Skipped)
    )
}

/// Print the resolved jobs, grouped by stage, without running anything.
pub fn print_job_list(pipeline: &ResolvedPipeline) {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let _ = write_job_list(&mut out, pipeline);
}

pub fn write_job_list(out: &mut impl Write, pipeline: &ResolvedPipeline) -> io::Result<()> {
    if let Some(name) = &pipeline.workflow.name {
        writeln!(out, "pipeline: {name}")?;
    }
    if !pipeline.workflow.run {
        writeln!(out, "workflow rules prevent this pipeline from running")?;
    }

    for stage in &pipeline.stages {
        let mut jobs = pipeline.jobs_in_stage(&stage.name).peekable();
        if jobs.peek().is_none() {
            continue;
        }
        writeln!(out, "{}:", stage.name)?;
        for job in jobs {
            let mut line = format!("  - {} (when: {}", job.name, job.when);
            if job.allow_failure.is_allowed() {
                line.push_str(", allow_failure");
            }
            line.push(')');
            if let Some(needs) = &job.needs {
                let names: Vec<String> = needs.iter().map(|n| n.to_string()).collect();
                line.push_str(&format!(" needs: [{}]", names.join(", ")));
            }
            writeln!(out, "{line}")?;
        }
    }
    Ok(())
}
