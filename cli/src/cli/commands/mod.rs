//! Command implementations.
//!
//! Commands are synchronous entry points. Each one that touches the network
//! builds its own tokio runtime through [`run_async`], which also wires
//! Ctrl+C to the shared [`ShutdownCoordinator`].

pub mod builds;
pub mod export;
pub mod hg;
pub mod import;
pub mod version;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::client::HttpClient;
use crate::config::Instance;
use crate::error::{Error, Result};
use crate::export::{
    BuildsExporter, GitExporter, HgExporter, ListsExporter, MetaExporter, PasteExporter, Service,
    ServiceExporter, TodoExporter,
};
use crate::shutdown::{SharedShutdown, ShutdownCoordinator};

/// Per-log timeout for build logs.
const BUILD_LOG_TIMEOUT: Duration = Duration::from_secs(120);

/// Mailing list archives are generated on the fly and can be slow.
const ARCHIVE_TIMEOUT: Duration = Duration::from_secs(600);

/// Tracker dumps, same as archives.
const DUMP_TIMEOUT: Duration = Duration::from_secs(600);

/// Run `f` to completion on a fresh runtime, cancelling it on Ctrl+C.
///
/// # Errors
///
/// Returns [`Error::Other`] if the runtime cannot be created, otherwise
/// whatever `f` returns.
pub fn run_async<T, F, Fut>(f: F) -> Result<T>
where
    F: FnOnce(SharedShutdown) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| Error::Other(format!("Failed to create async runtime: {e}")))?;
    let shutdown = ShutdownCoordinator::shared();

    rt.block_on(async {
        let trigger = Arc::clone(&shutdown);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, stopping");
                trigger.request_shutdown();
            }
        });

        f(shutdown).await
    })
}

/// HTTP client for one service of `instance`.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be built.
pub fn client_for(instance: &Instance, service: Service) -> Result<HttpClient> {
    HttpClient::new(instance.origin(service), instance.access_token.clone())
}

/// Exporter for one service of `instance`.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be built.
pub fn exporter_for(instance: &Instance, service: Service) -> Result<ServiceExporter<HttpClient>> {
    let client = client_for(instance, service)?;
    Ok(match service {
        Service::Meta => ServiceExporter::Meta(MetaExporter::new(client)),
        Service::Git => {
            ServiceExporter::Git(GitExporter::new(client, instance.ssh_user(service)))
        }
        Service::Hg => ServiceExporter::Hg(HgExporter::new(client, instance.ssh_user(service))),
        Service::Builds => {
            ServiceExporter::Builds(BuildsExporter::new(client, Some(BUILD_LOG_TIMEOUT)))
        }
        Service::Paste => ServiceExporter::Paste(PasteExporter::new(client)),
        Service::Lists => {
            ServiceExporter::Lists(ListsExporter::new(client, Some(ARCHIVE_TIMEOUT)))
        }
        Service::Todo => ServiceExporter::Todo(TodoExporter::new(client, Some(DUMP_TIMEOUT))),
    })
}
