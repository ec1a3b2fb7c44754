//! Remote service access.
//!
//! The engine talks to every service through the [`Client`] trait:
//!
//! - **GraphQL**: `execute(query, variables)` returning the `data` object
//! - **Uploads**: GraphQL multipart requests for spools, dumps and paste files
//! - **Downloads**: plain or ranged GETs whose body is streamed, never buffered
//!
//! [`HttpClient`] is the `reqwest` implementation used by the binary. Tests
//! drive the exporters through an in-memory fake instead.

mod http;

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::Result;
use crate::shutdown::ShutdownCoordinator;

pub use http::HttpClient;

/// Streamed response body.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// A file attached to a GraphQL mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    /// Variable path the file replaces, e.g. `spool` or `files.0`.
    pub variable: String,
    /// Local file to send.
    pub path: PathBuf,
    /// File name reported to the server. `None` sends an unnamed part.
    pub filename: Option<String>,
    /// MIME type of the part.
    pub mime_type: String,
}

/// An HTTP GET to stream from.
#[derive(Debug, Clone, Copy)]
pub struct DownloadRequest<'a> {
    pub url: &'a str,
    /// Sends `Range: bytes=<n>-` when set.
    pub range_from: Option<u64>,
    /// Overrides the client's default request timeout.
    pub timeout: Option<Duration>,
}

impl<'a> DownloadRequest<'a> {
    /// A plain GET of the whole resource.
    #[must_use]
    pub const fn full(url: &'a str) -> Self {
        Self {
            url,
            range_from: None,
            timeout: None,
        }
    }

    /// A GET starting at byte `offset`.
    #[must_use]
    pub const fn ranged(url: &'a str, offset: u64) -> Self {
        Self {
            url,
            range_from: Some(offset),
            timeout: None,
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Response head plus streamed body of a download.
pub struct Download {
    pub status: u16,
    pub content_range: Option<String>,
    pub body: ByteStream,
}

impl std::fmt::Debug for Download {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Download")
            .field("status", &self.status)
            .field("content_range", &self.content_range)
            .finish_non_exhaustive()
    }
}

/// Access to one service of an instance.
pub trait Client: Send + Sync {
    /// Service origin, e.g. `https://todo.sr.ht`.
    fn origin(&self) -> &str;

    /// Execute a GraphQL operation and return its `data` object.
    fn execute(
        &self,
        query: &str,
        variables: Value,
    ) -> impl Future<Output = Result<Value>> + Send;

    /// Execute a GraphQL operation with file uploads attached.
    fn execute_with_uploads(
        &self,
        query: &str,
        variables: Value,
        uploads: Vec<Upload>,
    ) -> impl Future<Output = Result<Value>> + Send;

    /// Issue a GET and hand back status, range header and body stream.
    fn download(
        &self,
        request: DownloadRequest<'_>,
    ) -> impl Future<Output = Result<Download>> + Send;
}

/// Execute `query` under cancellation and deserialize its `data` into `T`.
///
/// # Errors
///
/// Returns transport, GraphQL, cancellation or decoding errors.
pub async fn query<C, T>(
    client: &C,
    shutdown: &ShutdownCoordinator,
    query: &str,
    variables: Value,
) -> Result<T>
where
    C: Client,
    T: DeserializeOwned,
{
    let data = shutdown.run(client.execute(query, variables)).await?;
    Ok(serde_json::from_value(data)?)
}

/// Like [`query`], with uploads attached.
///
/// # Errors
///
/// Returns transport, GraphQL, cancellation or decoding errors.
pub async fn mutate_with_uploads<C, T>(
    client: &C,
    shutdown: &ShutdownCoordinator,
    query: &str,
    variables: Value,
    uploads: Vec<Upload>,
) -> Result<T>
where
    C: Client,
    T: DeserializeOwned,
{
    let data = shutdown
        .run(client.execute_with_uploads(query, variables, uploads))
        .await?;
    Ok(serde_json::from_value(data)?)
}
