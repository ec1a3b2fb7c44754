//! Import command implementation.

use std::path::Path;

use colored::Colorize;

use super::{exporter_for, run_async};
use crate::config;
use crate::error::{Error, Result};
use crate::export::{Driver, Service};

/// Execute `hut import`.
///
/// # Errors
///
/// Returns an error if `dir` is missing, the instance cannot be resolved or
/// the run is cancelled. Per-resource failures are reported, not returned.
pub fn execute(
    dir: &Path,
    config_path: Option<&Path>,
    instance: Option<&str>,
    json: bool,
) -> Result<()> {
    if !dir.is_dir() {
        return Err(Error::InvalidArgument(format!(
            "not a directory: {}",
            dir.display()
        )));
    }
    let instance = config::resolve_instance(config_path, instance)?;

    let exporters = Service::ALL
        .into_iter()
        .map(|service| exporter_for(&instance, service))
        .collect::<Result<Vec<_>>>()?;
    let driver = Driver::new(instance.url(), exporters);

    let report = run_async(|shutdown| async move { driver.import(&shutdown, dir).await })?;

    if json {
        let output = serde_json::json!({
            "success": report.failures.is_empty(),
            "instance": instance.name,
            "report": report,
        });
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    println!("Import into {} complete", instance.name.bold());
    println!();
    println!("  Imported: {}", report.imported.to_string().green());
    if report.skipped > 0 {
        println!("  Skipped:  {}", report.skipped);
    }
    if !report.failures.is_empty() {
        println!("  Failed:   {}", report.failures.len().to_string().red());
        for failure in &report.failures {
            println!("    {}: {}", failure.path.display(), failure.error.dimmed());
        }
    }

    Ok(())
}
