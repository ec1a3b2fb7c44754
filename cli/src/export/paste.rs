//! paste.sr.ht: pastes and their files.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use super::fetch::download_to_file;
use super::marker::{self, INFO_FILE, ResourceRecord};
use super::{ExportResult, PartialErrors, Service, paginate, sanitize_file_name};
use crate::client::{self, Client, Upload};
use crate::error::{Error, Result};
use crate::shutdown::ShutdownCoordinator;

const PASTES_QUERY: &str = "query pastes($cursor: Cursor) {
    pastes(cursor: $cursor) {
        results { id visibility files { filename contents } }
        cursor
    }
}";

const CREATE_PASTE: &str = "mutation createPaste($files: [Upload!]!, $visibility: Visibility!) {
    create(files: $files, visibility: $visibility) { id }
}";

const FILES_DIR: &str = "files";

#[derive(Debug, Deserialize)]
struct PasteFile {
    filename: Option<String>,
    /// Download URL of the blob.
    contents: String,
}

#[derive(Debug, Deserialize)]
struct Paste {
    id: String,
    visibility: String,
    files: Vec<PasteFile>,
}

/// `info.json` of an exported paste.
#[derive(Debug, Serialize, Deserialize)]
pub struct PasteInfo {
    #[serde(flatten)]
    pub base: ResourceRecord,
    pub visibility: String,
}

#[derive(Debug, Deserialize)]
struct Created {
    create: CreatedPaste,
}

#[derive(Debug, Deserialize)]
struct CreatedPaste {
    id: String,
}

/// Exports and imports pastes.
pub struct PasteExporter<C> {
    client: C,
}

impl<C: Client> PasteExporter<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    #[cfg(test)]
    pub(crate) fn client(&self) -> &C {
        &self.client
    }

    pub async fn export(&self, shutdown: &ShutdownCoordinator, dir: &Path) -> ExportResult {
        let mut partial = PartialErrors::new();
        let mut pastes =
            paginate::graphql(&self.client, shutdown, PASTES_QUERY, "/pastes", json!({}));

        while let Some(page) = pastes.next_page().await? {
            for paste in page {
                self.export_paste(shutdown, dir, paste, &mut partial).await?;
            }
        }

        partial.finish()
    }

    async fn export_paste(
        &self,
        shutdown: &ShutdownCoordinator,
        dir: &Path,
        paste: Paste,
        partial: &mut PartialErrors,
    ) -> Result<()> {
        let paste_dir = dir.join(sanitize_file_name(&paste.id));
        let info_path = paste_dir.join(INFO_FILE);
        if marker::exists(&info_path) {
            info!(paste = %paste.id, "already exported, skipping");
            return Ok(());
        }

        let files_dir = paste_dir.join(FILES_DIR);
        tokio::fs::create_dir_all(&files_dir).await?;

        for file in &paste.files {
            // An unnamed file is stored under the paste id.
            let name = file.filename.as_deref().unwrap_or(&paste.id);
            let dest = files_dir.join(sanitize_file_name(name));
            let result =
                download_to_file(&self.client, shutdown, &file.contents, &dest, None).await;
            partial.record(result)?;
        }

        let info = PasteInfo {
            base: ResourceRecord::new(Service::Paste.as_str(), paste.id),
            visibility: paste.visibility,
        };
        marker::write(&info_path, &info)?;
        info!(paste = %info.base.name, "exported paste");

        Ok(())
    }

    /// Recreate the paste exported to `dir` from its files.
    ///
    /// # Errors
    ///
    /// Returns an error if the marker or the files directory cannot be read,
    /// or if the upload fails.
    pub async fn import_resource(&self, shutdown: &ShutdownCoordinator, dir: &Path) -> Result<()> {
        let info: PasteInfo = marker::read(&dir.join(INFO_FILE))?;

        let mut paths = Vec::new();
        let mut entries = tokio::fs::read_dir(dir.join(FILES_DIR)).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                paths.push(entry.path());
            }
        }
        paths.sort();
        if paths.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "paste {} has no files to import",
                info.base.name
            )));
        }

        let uploads: Vec<Upload> = paths
            .into_iter()
            .enumerate()
            .map(|(i, path)| {
                let filename = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .filter(|name| *name != info.base.name);
                Upload {
                    variable: format!("files.{i}"),
                    path,
                    filename,
                    mime_type: "text/plain".to_string(),
                }
            })
            .collect();

        let variables = json!({
            "files": vec![Value::Null; uploads.len()],
            "visibility": info.visibility,
        });
        let created: Created =
            client::mutate_with_uploads(&self.client, shutdown, CREATE_PASTE, variables, uploads)
                .await?;
        info!(from = %info.base.name, to = %created.create.id, "imported paste");

        Ok(())
    }
}
