//! `reqwest`-backed [`Client`] for one service origin.

use std::collections::BTreeMap;
use std::time::Duration;

use futures::TryStreamExt;
use reqwest::header::{CONTENT_RANGE, RANGE};
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{Client, Download, DownloadRequest, Upload};
use crate::error::{Error, Result};

/// Timeout for plain GraphQL queries and mutations.
const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// GraphQL + download client bound to one service origin.
#[derive(Debug, Clone)]
pub struct HttpClient {
    http: reqwest::Client,
    origin: String,
    token: String,
}

#[derive(Debug, Serialize)]
struct GraphQlRequest<'a> {
    query: &'a str,
    variables: &'a Value,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphQlErrorEntry>,
}

#[derive(Debug, Deserialize)]
struct GraphQlErrorEntry {
    message: String,
}

impl HttpClient {
    /// Create a client for `origin`, authenticating with `token`.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn new(origin: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("hut/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(QUERY_TIMEOUT)
            .build()?;
        let origin = origin.into().trim_end_matches('/').to_string();

        Ok(Self {
            http,
            origin,
            token: token.into(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/query", self.origin)
    }

    /// Only URLs on our own origin receive the access token.
    fn owns(&self, url: &str) -> bool {
        url.strip_prefix(&self.origin)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    }

    async fn decode(response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        let url = response.url().to_string();

        let body: GraphQlResponse = match response.json().await {
            Ok(body) => body,
            Err(_) if !status.is_success() => {
                return Err(Error::UnexpectedStatus {
                    url,
                    status: status.as_u16(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        if !body.errors.is_empty() {
            return Err(Error::GraphQl {
                messages: body.errors.into_iter().map(|e| e.message).collect(),
            });
        }

        body.data.ok_or_else(|| Error::GraphQl {
            messages: vec!["response carried no data".to_string()],
        })
    }
}

impl Client for HttpClient {
    fn origin(&self) -> &str {
        &self.origin
    }

    async fn execute(&self, query: &str, variables: Value) -> Result<Value> {
        debug!(endpoint = %self.endpoint(), "GraphQL request");

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.token)
            .timeout(QUERY_TIMEOUT)
            .json(&GraphQlRequest {
                query,
                variables: &variables,
            })
            .send()
            .await?;

        Self::decode(response).await
    }

    async fn execute_with_uploads(
        &self,
        query: &str,
        variables: Value,
        uploads: Vec<Upload>,
    ) -> Result<Value> {
        let operations = serde_json::to_string(&GraphQlRequest {
            query,
            variables: &variables,
        })?;

        let map: BTreeMap<String, Vec<String>> = uploads
            .iter()
            .enumerate()
            .map(|(i, upload)| (i.to_string(), vec![format!("variables.{}", upload.variable)]))
            .collect();

        let mut form = Form::new()
            .text("operations", operations)
            .text("map", serde_json::to_string(&map)?);

        for (i, upload) in uploads.into_iter().enumerate() {
            let file = tokio::fs::File::open(&upload.path).await?;
            let len = file.metadata().await?.len();
            debug!(path = %upload.path.display(), len, "attaching upload");

            let mut part = Part::stream_with_length(reqwest::Body::from(file), len)
                .mime_str(&upload.mime_type)?;
            if let Some(filename) = upload.filename {
                part = part.file_name(filename);
            }
            form = form.part(i.to_string(), part);
        }

        // Spools and dumps can be large: no overall timeout, cancellation still applies.
        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.token)
            .multipart(form)
            .send()
            .await?;

        Self::decode(response).await
    }

    async fn download(&self, request: DownloadRequest<'_>) -> Result<Download> {
        let mut builder = self.http.get(request.url);
        if let Some(offset) = request.range_from {
            builder = builder.header(RANGE, format!("bytes={offset}-"));
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        if self.owns(request.url) {
            builder = builder.bearer_auth(&self.token);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let content_range = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        debug!(url = request.url, status, ?content_range, "download response");

        Ok(Download {
            status,
            content_range,
            body: Box::pin(response.bytes_stream().map_err(Error::from)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_is_normalised() {
        let client = HttpClient::new("https://git.sr.ht/", "token").unwrap();
        assert_eq!(client.origin(), "https://git.sr.ht");
        assert_eq!(client.endpoint(), "https://git.sr.ht/query");
    }

    #[test]
    fn test_token_only_sent_to_own_origin() {
        let client = HttpClient::new("https://lists.sr.ht", "token").unwrap();
        assert!(client.owns("https://lists.sr.ht/~me/list/archive.mbox"));
        assert!(!client.owns("https://lists.sr.ht.evil.example/archive.mbox"));
        assert!(!client.owns("https://logs.sr.ht/~me/1/log"));
    }
}
