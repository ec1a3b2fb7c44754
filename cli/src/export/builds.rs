//! builds.sr.ht: finished jobs with their manifests and logs.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use super::fetch::download_to_file;
use super::marker::{self, INFO_FILE, ResourceRecord};
use super::{ExportResult, PartialErrors, Service, paginate, sanitize_file_name};
use crate::builds::{JobStatus, Log};
use crate::client::Client;
use crate::error::Result;
use crate::shutdown::ShutdownCoordinator;

const JOBS_QUERY: &str = "query jobs($cursor: Cursor) {
    jobs(cursor: $cursor) {
        results {
            id status note tags visibility manifest
            log { fullURL }
            tasks { name status log { fullURL } }
        }
        cursor
    }
}";

#[derive(Debug, Deserialize)]
struct Task {
    name: String,
    log: Option<Log>,
}

#[derive(Debug, Deserialize)]
struct Job {
    id: i64,
    status: JobStatus,
    note: Option<String>,
    tags: Vec<String>,
    visibility: String,
    manifest: String,
    log: Option<Log>,
    tasks: Vec<Task>,
}

/// `info.json` of an exported job.
#[derive(Debug, Serialize, Deserialize)]
pub struct JobInfo {
    #[serde(flatten)]
    pub base: ResourceRecord,
    pub id: i64,
    pub status: JobStatus,
    pub note: Option<String>,
    pub tags: Vec<String>,
    pub visibility: String,
}

/// Exports finished build jobs. Import is not supported.
pub struct BuildsExporter<C> {
    client: C,
    log_timeout: Option<Duration>,
}

impl<C: Client> BuildsExporter<C> {
    pub fn new(client: C, log_timeout: Option<Duration>) -> Self {
        Self {
            client,
            log_timeout,
        }
    }

    pub async fn export(&self, shutdown: &ShutdownCoordinator, dir: &Path) -> ExportResult {
        let mut partial = PartialErrors::new();
        let mut jobs =
            paginate::graphql::<_, Job>(&self.client, shutdown, JOBS_QUERY, "/jobs", json!({}));

        while let Some(page) = jobs.next_page().await? {
            for job in page {
                if !matches!(job.status, JobStatus::Success | JobStatus::Failed) {
                    debug!(job = job.id, status = ?job.status, "job not finished, skipping");
                    continue;
                }
                self.export_job(shutdown, dir, job, &mut partial).await?;
            }
        }

        partial.finish()
    }

    async fn export_job(
        &self,
        shutdown: &ShutdownCoordinator,
        dir: &Path,
        job: Job,
        partial: &mut PartialErrors,
    ) -> Result<()> {
        let job_dir = dir.join(job.id.to_string());
        let info_path = job_dir.join(INFO_FILE);
        if marker::exists(&info_path) {
            info!(job = job.id, "already exported, skipping");
            return Ok(());
        }
        tokio::fs::create_dir_all(&job_dir).await?;

        tokio::fs::write(job_dir.join("manifest.yml"), &job.manifest).await?;

        if let Some(log) = &job.log {
            partial.record(self.download(shutdown, log, &job_dir.join("_build.log")).await)?;
        }
        for task in &job.tasks {
            let Some(log) = &task.log else {
                continue;
            };
            let dest = job_dir.join(format!("{}.log", sanitize_file_name(&task.name)));
            partial.record(self.download(shutdown, log, &dest).await)?;
        }

        let info = JobInfo {
            base: ResourceRecord::new(Service::Builds.as_str(), job.id.to_string()),
            id: job.id,
            status: job.status,
            note: job.note,
            tags: job.tags,
            visibility: job.visibility,
        };
        marker::write(&info_path, &info)?;
        info!(job = info.id, "exported job");

        Ok(())
    }

    async fn download(&self, shutdown: &ShutdownCoordinator, log: &Log, dest: &Path) -> Result<u64> {
        download_to_file(&self.client, shutdown, &log.full_url, dest, self.log_timeout).await
    }
}
