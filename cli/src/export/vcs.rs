//! `git` and `hg` subprocesses.
//!
//! Clones and pushes go through the host's own binaries over SSH. Children
//! are killed if the surrounding future is dropped (cancellation).

use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::error::{Error, Result};
use crate::shutdown::ShutdownCoordinator;

/// Run `program args…` to completion, capturing its output.
///
/// # Errors
///
/// Returns [`Error::Command`] with the trimmed stderr on a non-zero exit,
/// [`Error::Io`] if the program cannot be spawned, or [`Error::Cancelled`].
pub async fn run<I, S>(shutdown: &ShutdownCoordinator, program: &str, args: I) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    debug!(?command, "running");

    let output = shutdown.run(async { Ok(command.output().await?) }).await?;
    if !output.status.success() {
        return Err(Error::Command {
            program: program.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(())
}

/// Host part of a service origin: `https://git.sr.ht/` → `git.sr.ht`.
#[must_use]
pub fn host_of(origin: &str) -> &str {
    let rest = origin.split_once("://").map_or(origin, |(_, rest)| rest);
    let host = rest.split('/').next().unwrap_or(rest);
    // SSH listens on its own port; drop the HTTP one.
    host.split(':').next().unwrap_or(host)
}

/// scp-style remote understood by git: `git@git.sr.ht:~user/repo`.
#[must_use]
pub fn git_ssh_url(ssh_user: &str, origin: &str, owner: &str, repo: &str) -> String {
    format!("{ssh_user}@{}:{owner}/{repo}", host_of(origin))
}

/// URL-style remote understood by Mercurial: `ssh://hg@hg.sr.ht/~user/repo`.
#[must_use]
pub fn hg_ssh_url(ssh_user: &str, origin: &str, owner: &str, repo: &str) -> String {
    format!("ssh://{ssh_user}@{}/{owner}/{repo}", host_of(origin))
}

/// Clone into `dest` through a sibling `.partial` directory.
///
/// `dest` only appears once the clone has fully succeeded, so its presence
/// can serve as the "already exported" marker.
///
/// # Errors
///
/// Returns any error from the clone command or the final rename.
pub async fn clone_into<F>(
    shutdown: &ShutdownCoordinator,
    program: &str,
    dest: &Path,
    clone_args: F,
) -> Result<()>
where
    F: FnOnce(&Path) -> Vec<std::ffi::OsString>,
{
    let mut partial = dest.as_os_str().to_owned();
    partial.push(".partial");
    let partial = std::path::PathBuf::from(partial);

    if partial.exists() {
        tokio::fs::remove_dir_all(&partial).await?;
    }

    if let Err(e) = run(shutdown, program, clone_args(&partial)).await {
        let _ = tokio::fs::remove_dir_all(&partial).await;
        return Err(e);
    }

    tokio::fs::rename(&partial, dest).await?;
    Ok(())
}
