//! lists.sr.ht: mailing lists and their mbox archives.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use super::fetch::download_to_file;
use super::marker::{self, INFO_FILE, ResourceRecord};
use super::{ExportResult, PartialErrors, Service, paginate, sanitize_file_name};
use crate::client::{self, Client, Upload};
use crate::error::Result;
use crate::shutdown::ShutdownCoordinator;

const LISTS_QUERY: &str = "query mailingLists($cursor: Cursor) {
    me {
        mailingLists(cursor: $cursor) {
            results { id name description visibility permitMime rejectMime archive }
            cursor
        }
    }
}";

const CREATE_LIST: &str = "mutation createMailingList($name: String!, $description: String, $visibility: Visibility!) {
    createMailingList(name: $name, description: $description, visibility: $visibility) { id }
}";

const UPDATE_LIST: &str = "mutation updateMailingList($id: Int!, $input: MailingListInput!) {
    updateMailingList(id: $id, input: $input) { id }
}";

const IMPORT_SPOOL: &str = "mutation importMailingListSpool($id: Int!, $spool: Upload!) {
    importMailingListSpool(listID: $id, spool: $spool)
}";

const ARCHIVE_FILE: &str = "archive.mbox";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MailingList {
    name: String,
    description: Option<String>,
    visibility: String,
    permit_mime: Vec<String>,
    reject_mime: Vec<String>,
    /// Download URL of the mbox archive.
    archive: String,
}

/// `info.json` of an exported mailing list.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailingListInfo {
    #[serde(flatten)]
    pub base: ResourceRecord,
    pub description: Option<String>,
    pub visibility: String,
    pub permit_mime: Vec<String>,
    pub reject_mime: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Created {
    create_mailing_list: CreatedList,
}

#[derive(Debug, Deserialize)]
struct CreatedList {
    id: i64,
}

/// Exports and imports mailing lists.
pub struct ListsExporter<C> {
    client: C,
    archive_timeout: Option<Duration>,
}

impl<C: Client> ListsExporter<C> {
    pub fn new(client: C, archive_timeout: Option<Duration>) -> Self {
        Self {
            client,
            archive_timeout,
        }
    }

    pub async fn export(&self, shutdown: &ShutdownCoordinator, dir: &Path) -> ExportResult {
        let mut partial = PartialErrors::new();
        let mut lists = paginate::graphql(
            &self.client,
            shutdown,
            LISTS_QUERY,
            "/me/mailingLists",
            json!({}),
        );

        while let Some(page) = lists.next_page().await? {
            for list in page {
                self.export_list(shutdown, dir, list, &mut partial).await?;
            }
        }

        partial.finish()
    }

    async fn export_list(
        &self,
        shutdown: &ShutdownCoordinator,
        dir: &Path,
        list: MailingList,
        partial: &mut PartialErrors,
    ) -> Result<()> {
        let list_dir = dir.join(sanitize_file_name(&list.name));
        let info_path = list_dir.join(INFO_FILE);
        if marker::exists(&info_path) {
            info!(list = %list.name, "already exported, skipping");
            return Ok(());
        }
        tokio::fs::create_dir_all(&list_dir).await?;

        let result = download_to_file(
            &self.client,
            shutdown,
            &list.archive,
            &list_dir.join(ARCHIVE_FILE),
            self.archive_timeout,
        )
        .await;
        // No archive, no marker: the next run retries this list.
        if partial.record(result)?.is_none() {
            return Ok(());
        }

        let info = MailingListInfo {
            base: ResourceRecord::new(Service::Lists.as_str(), list.name),
            description: list.description,
            visibility: list.visibility,
            permit_mime: list.permit_mime,
            reject_mime: list.reject_mime,
        };
        marker::write(&info_path, &info)?;
        info!(list = %info.base.name, "exported mailing list");

        Ok(())
    }

    /// Recreate the list exported to `dir` and import its archive.
    ///
    /// # Errors
    ///
    /// Returns an error if the marker cannot be read or a mutation fails.
    pub async fn import_resource(&self, shutdown: &ShutdownCoordinator, dir: &Path) -> Result<()> {
        let info: MailingListInfo = marker::read(&dir.join(INFO_FILE))?;

        let created: Created = client::query(
            &self.client,
            shutdown,
            CREATE_LIST,
            json!({
                "name": info.base.name,
                "description": info.description,
                "visibility": info.visibility,
            }),
        )
        .await?;
        let id = created.create_mailing_list.id;

        let _: serde_json::Value = client::query(
            &self.client,
            shutdown,
            UPDATE_LIST,
            json!({
                "id": id,
                "input": {"permitMime": info.permit_mime, "rejectMime": info.reject_mime},
            }),
        )
        .await?;

        let archive = dir.join(ARCHIVE_FILE);
        if !archive.is_file() {
            warn!(list = %info.base.name, "no archive to import");
            return Ok(());
        }
        let spool = Upload {
            variable: "spool".to_string(),
            path: archive,
            filename: Some(ARCHIVE_FILE.to_string()),
            mime_type: "application/mbox".to_string(),
        };
        let _: serde_json::Value = client::mutate_with_uploads(
            &self.client,
            shutdown,
            IMPORT_SPOOL,
            json!({"id": id, "spool": null}),
            vec![spool],
        )
        .await?;
        info!(list = %info.base.name, id, "imported mailing list");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::ExportError;
    use crate::testing::FakeClient;
    use tempfile::TempDir;

    fn lists_page() -> serde_json::Value {
        json!({"me": {"mailingLists": {
            "results": [
                {
                    "id": 1, "name": "devel", "description": "Development",
                    "visibility": "PUBLIC", "permitMime": ["text/plain"],
                    "rejectMime": ["text/html"],
                    "archive": "https://lists.sr.ht/~alice/devel/archive.mbox"
                },
                {
                    "id": 2, "name": "announce", "description": null,
                    "visibility": "UNLISTED", "permitMime": [], "rejectMime": [],
                    "archive": "https://lists.sr.ht/~alice/announce/archive.mbox"
                }
            ],
            "cursor": null
        }}})
    }

    #[tokio::test]
    async fn test_failed_archive_leaves_list_unmarked() {
        let temp_dir = TempDir::new().unwrap();
        let client = FakeClient::new("https://lists.sr.ht");
        client.respond("mailingLists", lists_page());
        client.serve("https://lists.sr.ht/~alice/devel/archive.mbox", 200, b"From a@b\n");
        client.serve("https://lists.sr.ht/~alice/announce/archive.mbox", 503, b"");
        let exporter = ListsExporter::new(client, None);
        let shutdown = ShutdownCoordinator::new();

        let result = exporter.export(&shutdown, temp_dir.path()).await;
        assert!(matches!(result, Err(ExportError::Partial(errors)) if errors.len() == 1));

        let devel = temp_dir.path().join("devel");
        assert_eq!(std::fs::read(devel.join(ARCHIVE_FILE)).unwrap(), b"From a@b\n");
        let info: MailingListInfo = marker::read(&devel.join(INFO_FILE)).unwrap();
        assert_eq!(info.permit_mime, vec!["text/plain"]);
        assert_eq!(info.reject_mime, vec!["text/html"]);

        let announce = temp_dir.path().join("announce");
        assert!(!announce.join(INFO_FILE).exists());
        assert!(!announce.join(ARCHIVE_FILE).exists());
    }

    #[tokio::test]
    async fn test_import_creates_updates_and_uploads() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join(ARCHIVE_FILE), "From a@b\n").unwrap();
        marker::write(
            &temp_dir.path().join(INFO_FILE),
            &MailingListInfo {
                base: ResourceRecord::new("lists.sr.ht", "devel"),
                description: Some("Development".to_string()),
                visibility: "PUBLIC".to_string(),
                permit_mime: vec!["text/plain".to_string()],
                reject_mime: vec![],
            },
        )
        .unwrap();

        let client = FakeClient::new("https://lists.sr.ht");
        client.respond("createMailingList", json!({"createMailingList": {"id": 42}}));
        client.respond("updateMailingList", json!({"updateMailingList": {"id": 42}}));
        client.respond("importMailingListSpool", json!({"importMailingListSpool": true}));
        let exporter = ListsExporter::new(client, None);
        let shutdown = ShutdownCoordinator::new();

        exporter.import_resource(&shutdown, temp_dir.path()).await.unwrap();

        let operations: Vec<_> = exporter
            .client
            .graphql_calls()
            .into_iter()
            .map(|c| c.operation)
            .collect();
        assert_eq!(
            operations,
            vec!["createMailingList", "updateMailingList", "importMailingListSpool"]
        );

        let update = &exporter.client.calls_for("updateMailingList")[0];
        assert_eq!(update.variables["id"], 42);
        assert_eq!(update.variables["input"]["permitMime"], json!(["text/plain"]));

        let spool = &exporter.client.calls_for("importMailingListSpool")[0];
        assert_eq!(spool.uploads[0].variable, "spool");
        assert_eq!(spool.upload_bodies[0], b"From a@b\n");
    }
}
