//! Runs exporters service by service and imports from an export tree.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use super::marker::{self, ExportStamp, INFO_FILE, ResourceRecord, STAMP_FILE};
use super::{ExportError, Service, ServiceExporter};
use crate::client::Client;
use crate::error::{Error, Result};
use crate::shutdown::ShutdownCoordinator;

/// What happened to one service during export.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ServiceOutcome {
    Exported,
    /// A previous run already stamped the service.
    Skipped,
    Partial { failures: Vec<String> },
    Failed { error: String },
}

#[derive(Debug, Serialize)]
pub struct ServiceReport {
    pub service: Service,
    #[serde(flatten)]
    pub outcome: ServiceOutcome,
}

/// Per-service results of [`Driver::export`].
#[derive(Debug, Default, Serialize)]
pub struct ExportReport {
    pub services: Vec<ServiceReport>,
}

impl ExportReport {
    /// Whether any service did not fully export.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.services.iter().any(|s| {
            matches!(
                s.outcome,
                ServiceOutcome::Partial { .. } | ServiceOutcome::Failed { .. }
            )
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ImportFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Results of [`Driver::import`].
#[derive(Debug, Default, Serialize)]
pub struct ImportReport {
    pub imported: usize,
    /// Markers of services this instance cannot import into.
    pub skipped: usize,
    pub failures: Vec<ImportFailure>,
}

/// Drives a set of exporters against one instance.
pub struct Driver<C> {
    instance: String,
    exporters: Vec<ServiceExporter<C>>,
}

impl<C: Client> Driver<C> {
    /// `instance` is recorded in every export stamp.
    pub fn new(instance: impl Into<String>, exporters: Vec<ServiceExporter<C>>) -> Self {
        let mut exporters = exporters;
        exporters.sort_by_key(ServiceExporter::service);
        Self {
            instance: instance.into(),
            exporters,
        }
    }

    fn exporter(&self, service: Service) -> Option<&ServiceExporter<C>> {
        self.exporters.iter().find(|e| e.service() == service)
    }

    /// Export every service into `dir/<service>/`.
    ///
    /// A failing service is reported and the next one still runs.
    ///
    /// # Errors
    ///
    /// Returns an error only if `dir` cannot be created or the run is
    /// cancelled.
    pub async fn export(&self, shutdown: &ShutdownCoordinator, dir: &Path) -> Result<ExportReport> {
        tokio::fs::create_dir_all(dir).await?;
        let mut report = ExportReport::default();

        for exporter in &self.exporters {
            let service = exporter.service();
            let outcome = self.export_service(shutdown, exporter, dir).await?;
            report.services.push(ServiceReport { service, outcome });
        }

        Ok(report)
    }

    async fn export_service(
        &self,
        shutdown: &ShutdownCoordinator,
        exporter: &ServiceExporter<C>,
        dir: &Path,
    ) -> Result<ServiceOutcome> {
        let service = exporter.service();
        let service_dir = dir.join(service.as_str());
        let stamp_path = service_dir.join(STAMP_FILE);

        if let Err(e) = tokio::fs::create_dir_all(&service_dir).await {
            error!(%service, error = %e, "cannot create service directory");
            return Ok(ServiceOutcome::Failed {
                error: e.to_string(),
            });
        }
        if marker::exists(&stamp_path) {
            info!(%service, "already exported, skipping");
            return Ok(ServiceOutcome::Skipped);
        }

        info!(%service, "exporting");
        let outcome = match exporter.export(shutdown, &service_dir).await {
            Ok(()) => ServiceOutcome::Exported,
            Err(ExportError::Partial(errors)) => {
                warn!(%service, count = errors.len(), "exported with partial errors");
                ServiceOutcome::Partial {
                    failures: errors.iter().map(ToString::to_string).collect(),
                }
            }
            Err(ExportError::Fatal(Error::Cancelled)) => return Err(Error::Cancelled),
            Err(ExportError::Fatal(e)) => {
                error!(%service, error = %e, "export failed");
                return Ok(ServiceOutcome::Failed {
                    error: e.to_string(),
                });
            }
        };

        let stamp = ExportStamp {
            instance: self.instance.clone(),
            service: service.as_str().to_string(),
            date: Utc::now(),
        };
        if let Err(e) = marker::write(&stamp_path, &stamp) {
            error!(%service, error = %e, "cannot write export stamp");
            return Ok(ServiceOutcome::Failed {
                error: e.to_string(),
            });
        }
        info!(%service, "export finished");

        Ok(outcome)
    }

    /// Recreate every exported resource found under `dir`.
    ///
    /// Markers are visited in directory walk order. Each resource is imported
    /// independently; failures are reported and the walk continues.
    ///
    /// # Errors
    ///
    /// Returns an error only if the run is cancelled.
    pub async fn import(&self, shutdown: &ShutdownCoordinator, dir: &Path) -> Result<ImportReport> {
        let mut report = ImportReport::default();

        // A resource directory's subdirectories hold payload, never markers.
        let walk = WalkDir::new(dir).into_iter().filter_entry(|entry| {
            entry.depth() == 0
                || !entry.file_type().is_dir()
                || !entry
                    .path()
                    .parent()
                    .is_some_and(|parent| parent.join(INFO_FILE).is_file())
        });

        for entry in walk {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "cannot walk export tree");
                    report.failures.push(ImportFailure {
                        path: e.path().map_or_else(|| dir.to_path_buf(), Path::to_path_buf),
                        error: e.to_string(),
                    });
                    continue;
                }
            };
            if !entry.file_type().is_file() || entry.file_name() != INFO_FILE {
                continue;
            }

            let path = entry.path();
            match self.import_one(shutdown, path).await {
                Ok(true) => report.imported += 1,
                Ok(false) => report.skipped += 1,
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    error!(path = %path.display(), error = %e, "import failed");
                    report.failures.push(ImportFailure {
                        path: path.to_path_buf(),
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }

    /// Import the resource described by the marker at `path`. Returns `false`
    /// if no importer handles it.
    async fn import_one(&self, shutdown: &ShutdownCoordinator, path: &Path) -> Result<bool> {
        let record: ResourceRecord = marker::read(path)?;

        let Ok(service) = record.service.parse::<Service>() else {
            debug!(service = %record.service, "no importer for service");
            return Ok(false);
        };
        let Some(exporter) = self.exporter(service).filter(|e| e.supports_import()) else {
            debug!(%service, "no importer for service");
            return Ok(false);
        };

        let resource_dir = path.parent().unwrap_or(Path::new("."));
        info!(%service, name = %record.name, "importing");
        exporter.import_resource(shutdown, resource_dir).await?;

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::{MetaExporter, PasteExporter};
    use crate::testing::FakeClient;
    use serde_json::json;
    use tempfile::TempDir;

    fn paste_driver(client: FakeClient) -> Driver<FakeClient> {
        Driver::new(
            "https://sr.ht",
            vec![ServiceExporter::Paste(PasteExporter::new(client))],
        )
    }

    fn client_of(driver: &Driver<FakeClient>) -> &FakeClient {
        match &driver.exporters[0] {
            ServiceExporter::Paste(exporter) => exporter.client(),
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_stamped_service_makes_no_calls() {
        let temp_dir = TempDir::new().unwrap();
        let service_dir = temp_dir.path().join("paste.sr.ht");
        std::fs::create_dir_all(&service_dir).unwrap();
        marker::write(
            &service_dir.join(STAMP_FILE),
            &ExportStamp {
                instance: "https://sr.ht".to_string(),
                service: "paste.sr.ht".to_string(),
                date: Utc::now(),
            },
        )
        .unwrap();
        let driver = paste_driver(FakeClient::new("https://paste.sr.ht"));
        let shutdown = ShutdownCoordinator::new();

        let report = driver.export(&shutdown, temp_dir.path()).await.unwrap();

        assert!(matches!(report.services[0].outcome, ServiceOutcome::Skipped));
        assert_eq!(client_of(&driver).call_count(), 0);
    }

    #[tokio::test]
    async fn test_partial_service_is_stamped() {
        let temp_dir = TempDir::new().unwrap();
        let client = FakeClient::new("https://paste.sr.ht");
        client.respond(
            "pastes",
            json!({"pastes": {"results": [{
                "id": "abc", "visibility": "PUBLIC",
                "files": [{"filename": "a.txt", "contents": "https://paste.sr.ht/blob/a"}]
            }], "cursor": null}}),
        );
        client.serve("https://paste.sr.ht/blob/a", 500, b"");
        let driver = paste_driver(client);
        let shutdown = ShutdownCoordinator::new();

        let report = driver.export(&shutdown, temp_dir.path()).await.unwrap();

        assert!(matches!(
            &report.services[0].outcome,
            ServiceOutcome::Partial { failures } if failures.len() == 1
        ));
        assert!(report.has_failures());
        let stamp: ExportStamp =
            marker::read(&temp_dir.path().join("paste.sr.ht").join(STAMP_FILE)).unwrap();
        assert_eq!(stamp.instance, "https://sr.ht");
        assert_eq!(stamp.service, "paste.sr.ht");
    }

    #[tokio::test]
    async fn test_failed_service_does_not_stop_the_next() {
        let temp_dir = TempDir::new().unwrap();
        let meta = FakeClient::new("https://meta.sr.ht");
        meta.respond_error("profile", "unauthorized");
        let paste = FakeClient::new("https://paste.sr.ht");
        paste.respond("pastes", json!({"pastes": {"results": [], "cursor": null}}));
        let driver = Driver::new(
            "https://sr.ht",
            vec![
                ServiceExporter::Paste(PasteExporter::new(paste)),
                ServiceExporter::Meta(MetaExporter::new(meta)),
            ],
        );
        let shutdown = ShutdownCoordinator::new();

        let report = driver.export(&shutdown, temp_dir.path()).await.unwrap();

        let services: Vec<_> = report.services.iter().map(|s| s.service).collect();
        assert_eq!(services, vec![Service::Meta, Service::Paste]);
        assert!(matches!(report.services[0].outcome, ServiceOutcome::Failed { .. }));
        assert!(matches!(report.services[1].outcome, ServiceOutcome::Exported));
        assert!(!temp_dir.path().join("meta.sr.ht").join(STAMP_FILE).exists());
        assert!(temp_dir.path().join("paste.sr.ht").join(STAMP_FILE).exists());
    }

    #[tokio::test]
    async fn test_cancellation_aborts_export() {
        let temp_dir = TempDir::new().unwrap();
        let driver = paste_driver(FakeClient::new("https://paste.sr.ht"));
        let shutdown = ShutdownCoordinator::new();
        shutdown.request_shutdown();

        let result = driver.export(&shutdown, temp_dir.path()).await;
        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(!temp_dir.path().join("paste.sr.ht").join(STAMP_FILE).exists());
    }

    #[tokio::test]
    async fn test_import_dispatches_by_service() {
        let temp_dir = TempDir::new().unwrap();
        let paste_dir = temp_dir.path().join("paste.sr.ht").join("abc");
        std::fs::create_dir_all(paste_dir.join("files")).unwrap();
        std::fs::write(paste_dir.join("files").join("a.txt"), "hello").unwrap();
        marker::write(
            &paste_dir.join(INFO_FILE),
            &json!({"service": "paste.sr.ht", "name": "abc", "visibility": "PUBLIC"}),
        )
        .unwrap();
        let unknown_dir = temp_dir.path().join("unknown.sr.ht").join("thing");
        std::fs::create_dir_all(&unknown_dir).unwrap();
        marker::write(
            &unknown_dir.join(INFO_FILE),
            &ResourceRecord::new("unknown.sr.ht", "thing"),
        )
        .unwrap();

        let client = FakeClient::new("https://paste.sr.ht");
        client.respond("createPaste", json!({"create": {"id": "new"}}));
        let driver = paste_driver(client);
        let shutdown = ShutdownCoordinator::new();

        let report = driver.import(&shutdown, temp_dir.path()).await.unwrap();

        assert_eq!(report.imported, 1);
        assert_eq!(report.skipped, 1);
        assert!(report.failures.is_empty());
        assert_eq!(client_of(&driver).calls_for("createPaste").len(), 1);
        assert_eq!(client_of(&driver).graphql_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_payload_named_like_a_marker_is_not_imported() {
        let temp_dir = TempDir::new().unwrap();
        let paste_dir = temp_dir.path().join("paste.sr.ht").join("abc");
        std::fs::create_dir_all(paste_dir.join("files")).unwrap();
        std::fs::write(
            paste_dir.join("files").join(INFO_FILE),
            r#"{"editor.tabSize": 4}"#,
        )
        .unwrap();
        marker::write(
            &paste_dir.join(INFO_FILE),
            &json!({"service": "paste.sr.ht", "name": "abc", "visibility": "PUBLIC"}),
        )
        .unwrap();

        let client = FakeClient::new("https://paste.sr.ht");
        client.respond("createPaste", json!({"create": {"id": "new"}}));
        let driver = paste_driver(client);
        let shutdown = ShutdownCoordinator::new();

        let report = driver.import(&shutdown, temp_dir.path()).await.unwrap();

        assert_eq!(report.imported, 1);
        assert_eq!(report.skipped, 0);
        assert!(report.failures.is_empty());
        let calls = client_of(&driver).calls_for("createPaste");
        assert_eq!(calls.len(), 1);
        // The payload file itself is still uploaded with the paste.
        assert_eq!(calls[0].uploads[0].filename.as_deref(), Some(INFO_FILE));
    }

    #[tokio::test]
    async fn test_corrupt_marker_does_not_stop_import() {
        let temp_dir = TempDir::new().unwrap();
        let broken = temp_dir.path().join("paste.sr.ht").join("broken");
        std::fs::create_dir_all(&broken).unwrap();
        std::fs::write(broken.join(INFO_FILE), "{not json").unwrap();
        let good = temp_dir.path().join("paste.sr.ht").join("good");
        std::fs::create_dir_all(good.join("files")).unwrap();
        std::fs::write(good.join("files").join("notes.md"), "# hi").unwrap();
        marker::write(
            &good.join(INFO_FILE),
            &json!({"service": "paste.sr.ht", "name": "good", "visibility": "UNLISTED"}),
        )
        .unwrap();

        let client = FakeClient::new("https://paste.sr.ht");
        client.respond("createPaste", json!({"create": {"id": "new"}}));
        let driver = paste_driver(client);
        let shutdown = ShutdownCoordinator::new();

        let report = driver.import(&shutdown, temp_dir.path()).await.unwrap();

        assert_eq!(report.imported, 1);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].path.ends_with("broken/info.json"));
    }
}
