//! builds.sr.ht command implementations.

use std::io::Write;
use std::path::Path;

use colored::Colorize;
use serde::Serialize;

use super::{client_for, run_async};
use crate::builds::{JobStatus, follow_job};
use crate::cli::BuildsCommands;
use crate::config;
use crate::error::Result;
use crate::export::Service;

#[derive(Serialize)]
struct FollowOutput {
    job_id: i64,
    status: JobStatus,
}

/// Execute builds commands.
///
/// # Errors
///
/// Returns an error if the instance cannot be resolved, the job does not
/// exist or following it fails.
pub fn execute(
    command: &BuildsCommands,
    config_path: Option<&Path>,
    instance: Option<&str>,
    json: bool,
) -> Result<()> {
    match command {
        BuildsCommands::Follow { job_id } => follow(*job_id, config_path, instance, json),
    }
}

fn follow(job_id: i64, config_path: Option<&Path>, instance: Option<&str>, json: bool) -> Result<()> {
    let instance = config::resolve_instance(config_path, instance)?;
    let client = client_for(&instance, Service::Builds)?;

    let status = run_async(|shutdown| async move {
        let mut stdout = tokio::io::stdout();
        follow_job(&client, &shutdown, job_id, &mut stdout).await
    })?;

    // stdout carries the log itself; the status goes to stderr either way.
    report_status(&mut std::io::stderr(), job_id, status, json)
}

fn report_status<W: Write>(out: &mut W, job_id: i64, status: JobStatus, json: bool) -> Result<()> {
    if json {
        let output = FollowOutput { job_id, status };
        writeln!(out, "{}", serde_json::to_string(&output)?)?;
        return Ok(());
    }

    let label = format!("{status:?}").to_uppercase();
    let label = match status {
        JobStatus::Success => label.green(),
        JobStatus::Failed | JobStatus::Timeout => label.red(),
        _ => label.yellow(),
    };
    writeln!(out, "\nJob #{job_id}: {label}")?;
    Ok(())
}
