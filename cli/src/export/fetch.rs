//! Streaming downloads, plain and resumable.
//!
//! [`fetch_range`] continues a byte stream from a recorded offset using
//! `Range: bytes=<offset>-`. The offset stored after a read is the inclusive
//! end of the range the server returned, so the next response starts with a
//! byte that was already written: when resuming, exactly one leading byte is
//! dropped.
//!
//! [`download_to_file`] is the one-shot variant used by exports. The body goes
//! to a temporary file next to the destination and is renamed into place only
//! once it is complete and synced.

use std::path::Path;
use std::time::Duration;

use futures::TryStreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::client::{ByteStream, Client, DownloadRequest};
use crate::error::{Error, Result};
use crate::shutdown::ShutdownCoordinator;

/// Progress of one resumable stream.
///
/// `done` is decided by the caller from the upstream status; a successful
/// read never sets it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DownloadOffset {
    pub offset: u64,
    pub done: bool,
}

/// Parsed `Content-Range: bytes <start>-<end>/<total>` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub start: u64,
    /// Inclusive.
    pub end: u64,
    /// `None` when the server sent `*`.
    pub total: Option<u64>,
}

/// Parse a `Content-Range` response header.
///
/// # Errors
///
/// Returns [`Error::InvalidContentRange`] for anything but
/// `bytes <start>-<end>/<total|*>`.
pub fn parse_content_range(header: &str) -> Result<ContentRange> {
    let invalid = || Error::InvalidContentRange(header.to_string());

    let spec = header.trim().strip_prefix("bytes ").ok_or_else(invalid)?;
    let (range, total) = spec.split_once('/').ok_or_else(invalid)?;
    let (start, end) = range.split_once('-').ok_or_else(invalid)?;

    let start: u64 = start.trim().parse().map_err(|_| invalid())?;
    let end: u64 = end.trim().parse().map_err(|_| invalid())?;
    let total = match total.trim() {
        "*" => None,
        n => Some(n.parse::<u64>().map_err(|_| invalid())?),
    };

    if end < start {
        return Err(invalid());
    }

    Ok(ContentRange { start, end, total })
}

/// Copy `body` into `sink`, dropping the first `skip` bytes.
async fn copy_body<W>(mut body: ByteStream, sink: &mut W, mut skip: u64) -> Result<u64>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut written = 0u64;
    while let Some(mut chunk) = body.try_next().await? {
        if skip > 0 {
            let n = usize::try_from(skip).map_or(chunk.len(), |s| s.min(chunk.len()));
            chunk = chunk.slice(n..);
            skip -= n as u64;
        }
        if chunk.is_empty() {
            continue;
        }
        sink.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    sink.flush().await?;
    Ok(written)
}

/// Continue streaming `url` into `sink` from `state.offset`.
///
/// A no-op once `state.done` is set. On success `state.offset` becomes the
/// end of the range the server returned.
///
/// # Errors
///
/// Returns [`Error::UnexpectedStatus`] for anything but `206 Partial Content`,
/// [`Error::InvalidContentRange`] for a missing or malformed header, and
/// transport or cancellation errors as-is. Nothing is retried here.
pub async fn fetch_range<C, W>(
    client: &C,
    shutdown: &ShutdownCoordinator,
    url: &str,
    state: &mut DownloadOffset,
    sink: &mut W,
) -> Result<u64>
where
    C: Client,
    W: AsyncWrite + Unpin + Send + ?Sized,
{
    if state.done {
        return Ok(0);
    }

    let offset = state.offset;
    let (range, written) = shutdown
        .run(async {
            let download = client.download(DownloadRequest::ranged(url, offset)).await?;
            if download.status != 206 {
                return Err(Error::UnexpectedStatus {
                    url: url.to_string(),
                    status: download.status,
                });
            }

            let header = download
                .content_range
                .ok_or_else(|| Error::InvalidContentRange(String::new()))?;
            let range = parse_content_range(&header)?;

            let skip = u64::from(offset > 0);
            let written = copy_body(download.body, sink, skip).await?;
            Ok((range, written))
        })
        .await?;

    debug!(url, from = offset, to = range.end, written, "fetched range");
    state.offset = range.end;
    Ok(written)
}

/// Download `url` in full to `dest`.
///
/// # Errors
///
/// Returns [`Error::UnexpectedStatus`] if the server does not answer `200`;
/// exporters treat that as a partial failure. I/O, transport and
/// cancellation errors are returned as-is. `dest` is only created on success.
pub async fn download_to_file<C: Client>(
    client: &C,
    shutdown: &ShutdownCoordinator,
    url: &str,
    dest: &Path,
    timeout: Option<Duration>,
) -> Result<u64> {
    shutdown
        .run(async {
            let download = client
                .download(DownloadRequest::full(url).with_timeout(timeout))
                .await?;
            if download.status != 200 {
                return Err(Error::UnexpectedStatus {
                    url: url.to_string(),
                    status: download.status,
                });
            }

            let dir = dest.parent().unwrap_or_else(|| Path::new("."));
            let temp = tempfile::NamedTempFile::new_in(dir)?;
            let mut file = tokio::fs::File::from_std(temp.reopen()?);

            let written = copy_body(download.body, &mut file, 0).await?;
            file.sync_all().await?;
            drop(file);

            temp.persist(dest).map_err(|e| Error::Io(e.error))?;
            debug!(url, dest = %dest.display(), written, "downloaded");
            Ok(written)
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeClient, RangeServer};
    use tempfile::TempDir;

    const LOG: &[u8] = b"[#1234] build started\nsetup: ok\ntask build: compiling\ntask build: done\n";

    #[test]
    fn test_parse_content_range() {
        assert_eq!(
            parse_content_range("bytes 0-99/100").unwrap(),
            ContentRange {
                start: 0,
                end: 99,
                total: Some(100)
            }
        );
        assert_eq!(
            parse_content_range("bytes 42-42/*").unwrap(),
            ContentRange {
                start: 42,
                end: 42,
                total: None
            }
        );
        for bad in ["", "bytes", "items 0-1/2", "bytes 5-1/10", "bytes a-b/c", "bytes 0-9"] {
            assert!(
                matches!(parse_content_range(bad), Err(Error::InvalidContentRange(_))),
                "{bad:?} should not parse"
            );
        }
    }

    #[tokio::test]
    async fn test_resumed_fetch_matches_single_fetch() {
        let shutdown = ShutdownCoordinator::new();

        // Reference: one uninterrupted fetch of the finished stream.
        let complete = FakeClient::new("https://builds.sr.ht");
        complete.serve_range("https://logs.sr.ht/1/log", RangeServer::new(LOG));
        let mut reference = Vec::new();
        let mut state = DownloadOffset::default();
        fetch_range(&complete, &shutdown, "https://logs.sr.ht/1/log", &mut state, &mut reference)
            .await
            .unwrap();
        assert_eq!(reference, LOG);

        // Live stream: only a prefix is available at first, then it grows.
        for split in [2, 10, 37, LOG.len() - 1] {
            let client = FakeClient::new("https://builds.sr.ht");
            let server = RangeServer::new(&LOG[..split]);
            client.serve_range("https://logs.sr.ht/1/log", server.clone());

            let mut out = Vec::new();
            let mut state = DownloadOffset::default();
            fetch_range(&client, &shutdown, "https://logs.sr.ht/1/log", &mut state, &mut out)
                .await
                .unwrap();
            assert_eq!(state.offset, split as u64 - 1);
            assert!(!state.done);

            server.set_content(LOG);
            fetch_range(&client, &shutdown, "https://logs.sr.ht/1/log", &mut state, &mut out)
                .await
                .unwrap();
            assert_eq!(out, reference, "split at {split}");
            assert_eq!(state.offset, LOG.len() as u64 - 1);

            // Nothing new upstream: a further read adds nothing.
            fetch_range(&client, &shutdown, "https://logs.sr.ht/1/log", &mut state, &mut out)
                .await
                .unwrap();
            assert_eq!(out, reference);
        }
    }

    #[tokio::test]
    async fn test_done_stream_is_not_fetched() {
        let client = FakeClient::new("https://builds.sr.ht");
        let shutdown = ShutdownCoordinator::new();
        let mut state = DownloadOffset {
            offset: 12,
            done: true,
        };
        let mut out = Vec::new();

        let written = fetch_range(&client, &shutdown, "https://logs.sr.ht/1/log", &mut state, &mut out)
            .await
            .unwrap();
        assert_eq!(written, 0);
        assert!(client.download_calls().is_empty());
    }

    #[tokio::test]
    async fn test_non_partial_status_is_an_error() {
        let client = FakeClient::new("https://builds.sr.ht");
        client.serve("https://logs.sr.ht/1/log", 200, LOG);
        let shutdown = ShutdownCoordinator::new();
        let mut state = DownloadOffset::default();
        let mut out = Vec::new();

        let result =
            fetch_range(&client, &shutdown, "https://logs.sr.ht/1/log", &mut state, &mut out).await;
        assert!(matches!(result, Err(Error::UnexpectedStatus { status: 200, .. })));
        assert_eq!(state, DownloadOffset::default());
    }

    #[tokio::test]
    async fn test_download_to_file_requires_ok() {
        let temp_dir = TempDir::new().unwrap();
        let client = FakeClient::new("https://paste.sr.ht");
        client.serve("https://paste.sr.ht/blob/good", 200, b"hello");
        client.serve("https://paste.sr.ht/blob/gone", 404, b"not found");
        let shutdown = ShutdownCoordinator::new();

        let good = temp_dir.path().join("good.txt");
        let written = download_to_file(&client, &shutdown, "https://paste.sr.ht/blob/good", &good, None)
            .await
            .unwrap();
        assert_eq!(written, 5);
        assert_eq!(std::fs::read(&good).unwrap(), b"hello");

        let gone = temp_dir.path().join("gone.txt");
        let result =
            download_to_file(&client, &shutdown, "https://paste.sr.ht/blob/gone", &gone, None).await;
        assert!(matches!(result, Err(Error::UnexpectedStatus { status: 404, .. })));
        assert!(!gone.exists());
        // Only the finished file is left in the directory.
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 1);
    }
}
