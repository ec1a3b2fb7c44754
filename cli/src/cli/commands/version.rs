//! Version command implementation.

use std::path::Path;

use serde::Serialize;

use crate::config;
use crate::error::Result;

#[derive(Serialize)]
struct VersionOutput<'a> {
    version: &'a str,
    build: &'a str,
    /// Config file this invocation would read, existing or not.
    config: Option<String>,
}

/// Execute the version command.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn execute(config_path: Option<&Path>, json: bool) -> Result<()> {
    let version = env!("CARGO_PKG_VERSION");
    let build = if cfg!(debug_assertions) {
        "dev"
    } else {
        "release"
    };
    // `--config` already falls back to HUT_CONFIG through clap.
    let config = config::config_path(config_path, None)
        .ok()
        .map(|path| path.display().to_string());

    if json {
        let output = VersionOutput {
            version,
            build,
            config,
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    println!("hut {version} ({build})");
    if let Some(config) = config {
        println!("config: {config}");
    }
    Ok(())
}
