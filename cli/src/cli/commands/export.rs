//! Export command implementation.

use std::path::Path;

use colored::Colorize;

use super::{exporter_for, run_async};
use crate::config;
use crate::error::Result;
use crate::export::{Driver, ExportReport, Service, ServiceOutcome};

/// Execute `hut export`.
///
/// An empty `services` list exports every service.
///
/// # Errors
///
/// Returns an error if the instance cannot be resolved, the target directory
/// cannot be created or the run is cancelled. Per-service failures are
/// reported, not returned.
pub fn execute(
    dir: &Path,
    services: &[Service],
    config_path: Option<&Path>,
    instance: Option<&str>,
    json: bool,
) -> Result<()> {
    let instance = config::resolve_instance(config_path, instance)?;

    let selected: Vec<Service> = Service::ALL
        .into_iter()
        .filter(|s| services.is_empty() || services.contains(s))
        .collect();
    let exporters = selected
        .iter()
        .map(|&service| exporter_for(&instance, service))
        .collect::<Result<Vec<_>>>()?;
    let driver = Driver::new(instance.url(), exporters);

    let report = run_async(|shutdown| async move { driver.export(&shutdown, dir).await })?;

    if json {
        let output = serde_json::json!({
            "success": !report.has_failures(),
            "instance": instance.name,
            "dir": dir.display().to_string(),
            "services": report.services,
        });
        println!("{}", serde_json::to_string(&output)?);
    } else {
        print_report(&report, dir);
    }

    Ok(())
}

fn print_report(report: &ExportReport, dir: &Path) {
    for entry in &report.services {
        let service = entry.service.as_str();
        match &entry.outcome {
            ServiceOutcome::Exported => println!("  {} {service}", "✓".green()),
            ServiceOutcome::Skipped => {
                println!("  {} {service} {}", "-".dimmed(), "(already exported)".dimmed());
            }
            ServiceOutcome::Partial { failures } => {
                println!(
                    "  {} {service} ({} item(s) failed)",
                    "!".yellow(),
                    failures.len()
                );
                for failure in failures {
                    println!("      {}", failure.dimmed());
                }
            }
            ServiceOutcome::Failed { error } => {
                println!("  {} {service}: {error}", "✗".red());
            }
        }
    }
    println!();
    println!("  Location: {}", dir.display());
}
