//! hg.sr.ht command implementations.

use std::path::Path;

use serde_json::json;

use super::{client_for, run_async};
use crate::cli::HgCommands;
use crate::config;
use crate::error::Result;
use crate::export::{HgExporter, Service};

/// Execute hg commands.
///
/// # Errors
///
/// Returns an error if the instance cannot be resolved or the export or
/// import fails.
pub fn execute(
    command: &HgCommands,
    config_path: Option<&Path>,
    instance: Option<&str>,
    json: bool,
) -> Result<()> {
    let instance = config::resolve_instance(config_path, instance)?;
    let exporter = HgExporter::new(
        client_for(&instance, Service::Hg)?,
        instance.ssh_user(Service::Hg),
    );

    match command {
        HgCommands::Export { repo, dir } => {
            std::fs::create_dir_all(dir)?;
            run_async(|shutdown| async move {
                exporter.export_resource(&shutdown, dir, repo).await
            })?;
            if json {
                println!("{}", json!({"success": true, "repository": repo}));
            } else {
                println!("Exported {repo} to {}", dir.join(repo).display());
            }
        }
        HgCommands::Import { dir } => {
            run_async(|shutdown| async move { exporter.import_resource(&shutdown, dir).await })?;
            if json {
                println!("{}", json!({"success": true, "dir": dir.display().to_string()}));
            } else {
                println!("Imported {}", dir.display());
            }
        }
    }

    Ok(())
}
