//! Account export/import across sr.ht services.
//!
//! - **Export**: walk each service's collections, download artifacts, write
//!   one `info.json` marker per finished resource and one
//!   `export-stamp.json` per finished service
//! - **Import**: find markers on disk and recreate the resources remotely
//!
//! # Layout
//!
//! ```text
//! <dir>/
//!   builds.sr.ht/
//!     export-stamp.json
//!     1234/
//!       info.json  _build.log  build.log  test.log  manifest.yml
//!   paste.sr.ht/
//!     <paste id>/
//!       info.json  files/<filename>
//!   git.sr.ht/<repo>/      info.json  repository.git/
//!   hg.sr.ht/<repo>/       info.json  repository/
//!   lists.sr.ht/<list>/    info.json  archive.mbox
//!   todo.sr.ht/<tracker>/  info.json  tracker.json.gz
//!   meta.sr.ht/            profile.json  ssh.keys  keys.pgp
//! ```
//!
//! # Failure model
//!
//! A non-200 on one sub-resource is a *partial* failure: it is logged,
//! collected, and the walk continues. Anything else aborts the current
//! service (export) or resource (import). The [`Driver`] keeps going with
//! the next service or resource either way; only cancellation stops it.

mod builds;
mod driver;
pub mod fetch;
mod git;
mod hg;
mod lists;
pub mod marker;
mod meta;
pub mod paginate;
mod paste;
mod todo;
mod vcs;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use tracing::warn;

use crate::client::Client;
use crate::error::{Error, Result};
use crate::shutdown::ShutdownCoordinator;

pub use builds::BuildsExporter;
pub use driver::{Driver, ExportReport, ImportFailure, ImportReport, ServiceOutcome, ServiceReport};
pub use git::GitExporter;
pub use hg::HgExporter;
pub use lists::ListsExporter;
pub use meta::MetaExporter;
pub use paste::PasteExporter;
pub use todo::TodoExporter;

/// Outcome of an exporter run that did not fully succeed.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// Some sub-resources could not be downloaded; everything else was.
    #[error("export completed with {} partial error(s)", .0.len())]
    Partial(Vec<Error>),
    /// The walk was aborted.
    #[error(transparent)]
    Fatal(#[from] Error),
}

/// Result of [`ServiceExporter::export`].
pub type ExportResult = std::result::Result<(), ExportError>;

/// Degraded sub-resources collected during one export.
#[derive(Debug, Default)]
pub struct PartialErrors(Vec<Error>);

impl PartialErrors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep going after a non-200 download; propagate anything else.
    ///
    /// # Errors
    ///
    /// Returns `result`'s error unless it is [`Error::UnexpectedStatus`].
    pub fn record<T>(&mut self, result: Result<T>) -> Result<Option<T>> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(e @ Error::UnexpectedStatus { .. }) => {
                warn!(error = %e, "download failed, continuing");
                self.0.push(e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `Ok` if nothing degraded, [`ExportError::Partial`] otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Partial`] carrying every recorded failure.
    pub fn finish(self) -> ExportResult {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(ExportError::Partial(self.0))
        }
    }
}

/// The services an instance exposes to export/import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, clap::ValueEnum)]
pub enum Service {
    Meta,
    Git,
    Hg,
    Builds,
    Paste,
    Lists,
    Todo,
}

impl Service {
    /// Every service, in export order.
    pub const ALL: [Self; 7] = [
        Self::Meta,
        Self::Git,
        Self::Hg,
        Self::Builds,
        Self::Paste,
        Self::Lists,
        Self::Todo,
    ];

    /// Short name used in config and on the command line.
    #[must_use]
    pub const fn short_name(&self) -> &'static str {
        match self {
            Self::Meta => "meta",
            Self::Git => "git",
            Self::Hg => "hg",
            Self::Builds => "builds",
            Self::Paste => "paste",
            Self::Lists => "lists",
            Self::Todo => "todo",
        }
    }

    /// Name recorded in markers and used as the export directory.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Meta => "meta.sr.ht",
            Self::Git => "git.sr.ht",
            Self::Hg => "hg.sr.ht",
            Self::Builds => "builds.sr.ht",
            Self::Paste => "paste.sr.ht",
            Self::Lists => "lists.sr.ht",
            Self::Todo => "todo.sr.ht",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl serde::Serialize for Service {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl FromStr for Service {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|service| service.short_name() == s || service.as_str() == s)
            .ok_or_else(|| Error::InvalidArgument(format!("unknown service: {s}")))
    }
}

/// One exporter per service, dispatched by variant.
pub enum ServiceExporter<C> {
    Meta(MetaExporter<C>),
    Git(GitExporter<C>),
    Hg(HgExporter<C>),
    Builds(BuildsExporter<C>),
    Paste(PasteExporter<C>),
    Lists(ListsExporter<C>),
    Todo(TodoExporter<C>),
}

impl<C: Client> ServiceExporter<C> {
    #[must_use]
    pub const fn service(&self) -> Service {
        match self {
            Self::Meta(_) => Service::Meta,
            Self::Git(_) => Service::Git,
            Self::Hg(_) => Service::Hg,
            Self::Builds(_) => Service::Builds,
            Self::Paste(_) => Service::Paste,
            Self::Lists(_) => Service::Lists,
            Self::Todo(_) => Service::Todo,
        }
    }

    /// Whether [`Self::import_resource`] can recreate this service's resources.
    #[must_use]
    pub const fn supports_import(&self) -> bool {
        !matches!(self, Self::Meta(_) | Self::Builds(_))
    }

    /// Export every resource of this service into `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Partial`] if some downloads failed and
    /// [`ExportError::Fatal`] if the walk was aborted.
    pub async fn export(&self, shutdown: &ShutdownCoordinator, dir: &Path) -> ExportResult {
        match self {
            Self::Meta(ex) => ex.export(shutdown, dir).await,
            Self::Git(ex) => ex.export(shutdown, dir).await,
            Self::Hg(ex) => ex.export(shutdown, dir).await,
            Self::Builds(ex) => ex.export(shutdown, dir).await,
            Self::Paste(ex) => ex.export(shutdown, dir).await,
            Self::Lists(ex) => ex.export(shutdown, dir).await,
            Self::Todo(ex) => ex.export(shutdown, dir).await,
        }
    }

    /// Recreate the resource exported to `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the marker is unreadable, a remote call fails, or
    /// the service has no importer.
    pub async fn import_resource(&self, shutdown: &ShutdownCoordinator, dir: &Path) -> Result<()> {
        match self {
            Self::Git(ex) => ex.import_resource(shutdown, dir).await,
            Self::Hg(ex) => ex.import_resource(shutdown, dir).await,
            Self::Paste(ex) => ex.import_resource(shutdown, dir).await,
            Self::Lists(ex) => ex.import_resource(shutdown, dir).await,
            Self::Todo(ex) => ex.import_resource(shutdown, dir).await,
            Self::Meta(_) | Self::Builds(_) => Err(Error::InvalidArgument(format!(
                "{} does not support import",
                self.service()
            ))),
        }
    }
}

/// Make a server-provided name safe to use as a single path component.
#[must_use]
pub fn sanitize_file_name(name: &str) -> String {
    match name {
        "" | "." | ".." => "_".to_string(),
        _ => name.replace(['/', '\\', '\0'], "_"),
    }
}
