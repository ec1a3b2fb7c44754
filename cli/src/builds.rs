//! builds.sr.ht job states and live log following.
//!
//! [`follow_job`] polls a job once per [`POLL_INTERVAL`] and streams the job
//! log followed by each task log, in task order, into a writer. Each log is
//! read with ranged requests so only new bytes cross the wire.
//!
//! Whether a log is finished comes from the job and task states, never from
//! the read itself: a successful read of a still-running task only means
//! "nothing more yet".

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::client::{self, Client};
use crate::error::{Error, Result};
use crate::export::fetch::{DownloadOffset, fetch_range};
use crate::shutdown::ShutdownCoordinator;

/// Delay between two polls of a running job.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

const FOLLOW_QUERY: &str = "query followJob($id: Int!) {
    job(id: $id) {
        id status
        log { fullURL }
        tasks { name status log { fullURL } }
    }
}";

/// State of a build job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Queued,
    Running,
    Success,
    Failed,
    Timeout,
    Cancelled,
    #[serde(other)]
    Unknown,
}

impl JobStatus {
    /// The job will not change state again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Success | Self::Failed | Self::Timeout | Self::Cancelled
        )
    }
}

/// State of one task within a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
    #[serde(other)]
    Unknown,
}

impl TaskStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Skipped)
    }
}

/// Location of a log file.
#[derive(Debug, Clone, Deserialize)]
pub struct Log {
    #[serde(rename = "fullURL")]
    pub full_url: String,
}

#[derive(Debug, Deserialize)]
struct FollowTask {
    name: String,
    status: TaskStatus,
    log: Option<Log>,
}

#[derive(Debug, Deserialize)]
struct FollowJob {
    status: JobStatus,
    log: Option<Log>,
    tasks: Vec<FollowTask>,
}

#[derive(Debug, Deserialize)]
struct FollowData {
    job: Option<FollowJob>,
}

/// One log being followed.
#[derive(Debug, Default)]
struct LogStream {
    state: DownloadOffset,
    started: bool,
}

impl LogStream {
    /// Read whatever is new. A log that does not exist yet reads as empty.
    async fn pump<C, W>(
        &mut self,
        client: &C,
        shutdown: &ShutdownCoordinator,
        log: Option<&Log>,
        sink: &mut W,
    ) -> Result<()>
    where
        C: Client,
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let Some(log) = log else {
            return Ok(());
        };
        match fetch_range(client, shutdown, &log.full_url, &mut self.state, sink).await {
            Ok(_) => Ok(()),
            Err(Error::UnexpectedStatus { status: 404 | 416, .. }) => {
                debug!(url = %log.full_url, "log not available yet");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// Stream the logs of job `job_id` into `sink` until the job finishes.
///
/// Returns the job's final status.
///
/// # Errors
///
/// Returns [`Error::ResourceNotFound`] for an unknown job, and query, range,
/// sink or cancellation errors as they happen.
pub async fn follow_job<C, W>(
    client: &C,
    shutdown: &ShutdownCoordinator,
    job_id: i64,
    sink: &mut W,
) -> Result<JobStatus>
where
    C: Client,
    W: AsyncWrite + Unpin + Send + ?Sized,
{
    let mut job_log = LogStream::default();
    let mut task_logs: Vec<LogStream> = Vec::new();

    loop {
        let data: FollowData =
            client::query(client, shutdown, FOLLOW_QUERY, json!({ "id": job_id })).await?;
        let job = data.job.ok_or_else(|| Error::ResourceNotFound {
            name: format!("job #{job_id}"),
        })?;
        // Observed before reading, so a log is never marked done ahead of
        // the bytes written before the state change.
        let terminal = job.status.is_terminal();
        debug!(job_id, status = ?job.status, "polled job");

        job_log
            .pump(client, shutdown, job.log.as_ref(), sink)
            .await?;
        if terminal
            || job
                .tasks
                .iter()
                .any(|task| task.status != TaskStatus::Pending)
        {
            job_log.state.done = true;
        }

        task_logs.resize_with(job.tasks.len(), LogStream::default);
        for (task, stream) in job.tasks.iter().zip(task_logs.iter_mut()) {
            if task.status == TaskStatus::Pending && !terminal {
                break;
            }
            if stream.state.done {
                continue;
            }
            if !stream.started {
                sink.write_all(format!("\n==> {}\n", task.name).as_bytes())
                    .await?;
                stream.started = true;
            }

            stream.pump(client, shutdown, task.log.as_ref(), sink).await?;
            if task.status.is_terminal() || terminal {
                stream.state.done = true;
            } else {
                break;
            }
        }
        sink.flush().await?;

        if terminal {
            return Ok(job.status);
        }
        shutdown.sleep(POLL_INTERVAL).await?;
    }
}
