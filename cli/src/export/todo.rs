//! todo.sr.ht: trackers as gzipped JSON dumps.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use super::fetch::download_to_file;
use super::marker::{self, INFO_FILE, ResourceRecord};
use super::{ExportResult, PartialErrors, Service, paginate, sanitize_file_name};
use crate::client::{self, Client, Upload};
use crate::error::Result;
use crate::shutdown::ShutdownCoordinator;

const TRACKERS_QUERY: &str = "query trackers($cursor: Cursor) {
    me {
        trackers(cursor: $cursor) {
            results { id name description visibility }
            cursor
        }
    }
}";

const CREATE_TRACKER: &str = "mutation createTracker($name: String!, $description: String, $visibility: Visibility!) {
    createTracker(name: $name, description: $description, visibility: $visibility) { id }
}";

const IMPORT_DUMP: &str = "mutation importTrackerDump($id: Int!, $dump: Upload!) {
    importTrackerDump(trackerId: $id, dump: $dump)
}";

const DUMP_FILE: &str = "tracker.json.gz";

#[derive(Debug, Deserialize)]
struct Tracker {
    id: i64,
    name: String,
    description: Option<String>,
    visibility: String,
}

/// `info.json` of an exported tracker.
#[derive(Debug, Serialize, Deserialize)]
pub struct TrackerInfo {
    #[serde(flatten)]
    pub base: ResourceRecord,
    pub description: Option<String>,
    pub visibility: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Created {
    create_tracker: CreatedTracker,
}

#[derive(Debug, Deserialize)]
struct CreatedTracker {
    id: i64,
}

/// Exports and imports ticket trackers.
pub struct TodoExporter<C> {
    client: C,
    dump_timeout: Option<Duration>,
}

impl<C: Client> TodoExporter<C> {
    pub fn new(client: C, dump_timeout: Option<Duration>) -> Self {
        Self {
            client,
            dump_timeout,
        }
    }

    pub async fn export(&self, shutdown: &ShutdownCoordinator, dir: &Path) -> ExportResult {
        let mut partial = PartialErrors::new();
        let mut trackers = paginate::graphql(
            &self.client,
            shutdown,
            TRACKERS_QUERY,
            "/me/trackers",
            json!({}),
        );

        while let Some(page) = trackers.next_page().await? {
            for tracker in page {
                self.export_tracker(shutdown, dir, tracker, &mut partial)
                    .await?;
            }
        }

        partial.finish()
    }

    async fn export_tracker(
        &self,
        shutdown: &ShutdownCoordinator,
        dir: &Path,
        tracker: Tracker,
        partial: &mut PartialErrors,
    ) -> Result<()> {
        let tracker_dir = dir.join(sanitize_file_name(&tracker.name));
        let info_path = tracker_dir.join(INFO_FILE);
        if marker::exists(&info_path) {
            info!(tracker = %tracker.name, "already exported, skipping");
            return Ok(());
        }
        tokio::fs::create_dir_all(&tracker_dir).await?;

        let url = format!("{}/query/tracker/{}/export", self.client.origin(), tracker.id);
        let result = download_to_file(
            &self.client,
            shutdown,
            &url,
            &tracker_dir.join(DUMP_FILE),
            self.dump_timeout,
        )
        .await;
        if partial.record(result)?.is_none() {
            return Ok(());
        }

        let info = TrackerInfo {
            base: ResourceRecord::new(Service::Todo.as_str(), tracker.name),
            description: tracker.description,
            visibility: tracker.visibility,
        };
        marker::write(&info_path, &info)?;
        info!(tracker = %info.base.name, "exported tracker");

        Ok(())
    }

    /// Recreate the tracker exported to `dir` and load its dump.
    ///
    /// # Errors
    ///
    /// Returns an error if the marker cannot be read or a mutation fails.
    pub async fn import_resource(&self, shutdown: &ShutdownCoordinator, dir: &Path) -> Result<()> {
        let info: TrackerInfo = marker::read(&dir.join(INFO_FILE))?;

        let created: Created = client::query(
            &self.client,
            shutdown,
            CREATE_TRACKER,
            json!({
                "name": info.base.name,
                "description": info.description,
                "visibility": info.visibility,
            }),
        )
        .await?;
        let id = created.create_tracker.id;

        let dump = Upload {
            variable: "dump".to_string(),
            path: dir.join(DUMP_FILE),
            filename: Some(DUMP_FILE.to_string()),
            mime_type: "application/gzip".to_string(),
        };
        let _: serde_json::Value = client::mutate_with_uploads(
            &self.client,
            shutdown,
            IMPORT_DUMP,
            json!({"id": id, "dump": null}),
            vec![dump],
        )
        .await?;
        info!(tracker = %info.base.name, id, "imported tracker");

        Ok(())
    }
}
