//! In-memory [`Client`] for exercising the engine without a network.
//!
//! GraphQL responses are scripted per operation name and consumed in order.
//! Downloads are served from fixed bodies or from a [`RangeServer`] that
//! honours `Range` requests. Every call is logged for assertions.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use serde_json::Value;

use crate::client::{Client, Download, DownloadRequest, Upload};
use crate::error::{Error, Result};

/// Bodies are split into chunks this small to exercise streaming.
const CHUNK: usize = 7;

/// A growable resource answering ranged GETs with `206`.
#[derive(Debug, Clone, Default)]
pub struct RangeServer(Arc<Mutex<Vec<u8>>>);

impl RangeServer {
    pub fn new(content: &[u8]) -> Self {
        Self(Arc::new(Mutex::new(content.to_vec())))
    }

    pub fn set_content(&self, content: &[u8]) {
        *self.0.lock().unwrap() = content.to_vec();
    }

    fn respond(&self, range_from: Option<u64>) -> (u16, Option<String>, Vec<u8>) {
        let content = self.0.lock().unwrap();
        let Some(from) = range_from else {
            return (200, None, content.clone());
        };
        let from = usize::try_from(from).unwrap();
        if from >= content.len() {
            return (416, Some(format!("bytes */{}", content.len())), Vec::new());
        }
        let end = content.len() - 1;
        (206, Some(format!("bytes {from}-{end}/*")), content[from..].to_vec())
    }
}

#[derive(Debug, Clone)]
enum Served {
    Fixed { status: u16, body: Vec<u8> },
    Range(RangeServer),
}

/// One recorded GraphQL call.
#[derive(Debug, Clone)]
pub struct GraphQlCall {
    pub operation: String,
    pub variables: Value,
    pub uploads: Vec<Upload>,
    /// Contents of each upload, read when the call was made.
    pub upload_bodies: Vec<Vec<u8>>,
}

#[derive(Debug, Default)]
struct State {
    responses: HashMap<String, VecDeque<std::result::Result<Value, String>>>,
    served: HashMap<String, Served>,
    graphql_calls: Vec<GraphQlCall>,
    download_calls: Vec<String>,
}

/// Scripted stand-in for a service.
#[derive(Debug)]
pub struct FakeClient {
    origin: String,
    state: Mutex<State>,
}

/// Operation name of `query foo(...)` / `mutation bar { ... }`.
fn operation_name(query: &str) -> String {
    let rest = query.trim_start();
    let rest = rest
        .strip_prefix("query")
        .or_else(|| rest.strip_prefix("mutation"))
        .unwrap_or(rest);
    rest.trim_start()
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect()
}

impl FakeClient {
    pub fn new(origin: &str) -> Self {
        Self {
            origin: origin.to_string(),
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Queue `data` as the next answer to `operation`.
    pub fn respond(&self, operation: &str, data: Value) {
        self.state()
            .responses
            .entry(operation.to_string())
            .or_default()
            .push_back(Ok(data));
    }

    /// Queue a GraphQL error as the next answer to `operation`.
    pub fn respond_error(&self, operation: &str, message: &str) {
        self.state()
            .responses
            .entry(operation.to_string())
            .or_default()
            .push_back(Err(message.to_string()));
    }

    /// Serve a fixed status and body at `url`.
    pub fn serve(&self, url: &str, status: u16, body: &[u8]) {
        self.state().served.insert(
            url.to_string(),
            Served::Fixed {
                status,
                body: body.to_vec(),
            },
        );
    }

    /// Serve a range-capable resource at `url`.
    pub fn serve_range(&self, url: &str, server: RangeServer) {
        self.state().served.insert(url.to_string(), Served::Range(server));
    }

    pub fn graphql_calls(&self) -> Vec<GraphQlCall> {
        self.state().graphql_calls.clone()
    }

    /// Calls made for one operation name.
    pub fn calls_for(&self, operation: &str) -> Vec<GraphQlCall> {
        self.state()
            .graphql_calls
            .iter()
            .filter(|c| c.operation == operation)
            .cloned()
            .collect()
    }

    pub fn download_calls(&self) -> Vec<String> {
        self.state().download_calls.clone()
    }

    /// Total remote calls of any kind.
    pub fn call_count(&self) -> usize {
        let state = self.state();
        state.graphql_calls.len() + state.download_calls.len()
    }

    fn answer(&self, query: &str, variables: Value, uploads: Vec<Upload>) -> Result<Value> {
        let operation = operation_name(query);
        let upload_bodies = uploads
            .iter()
            .map(|u| std::fs::read(&u.path))
            .collect::<std::io::Result<Vec<_>>>()?;

        let mut state = self.state();
        state.graphql_calls.push(GraphQlCall {
            operation: operation.clone(),
            variables,
            uploads,
            upload_bodies,
        });

        match state
            .responses
            .get_mut(&operation)
            .and_then(VecDeque::pop_front)
        {
            Some(Ok(data)) => Ok(data),
            Some(Err(message)) => Err(Error::GraphQl {
                messages: vec![message],
            }),
            None => Err(Error::Other(format!("no scripted response for {operation}"))),
        }
    }
}

impl Client for FakeClient {
    fn origin(&self) -> &str {
        &self.origin
    }

    async fn execute(&self, query: &str, variables: Value) -> Result<Value> {
        self.answer(query, variables, Vec::new())
    }

    async fn execute_with_uploads(
        &self,
        query: &str,
        variables: Value,
        uploads: Vec<Upload>,
    ) -> Result<Value> {
        self.answer(query, variables, uploads)
    }

    async fn download(&self, request: DownloadRequest<'_>) -> Result<Download> {
        let served = {
            let mut state = self.state();
            state.download_calls.push(request.url.to_string());
            state.served.get(request.url).cloned()
        };

        let (status, content_range, body) = match served {
            Some(Served::Fixed { status, body }) => (status, None, body),
            Some(Served::Range(server)) => server.respond(request.range_from),
            None => (404, None, b"not found".to_vec()),
        };

        let chunks: Vec<Result<Bytes>> = body
            .chunks(CHUNK)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();

        Ok(Download {
            status,
            content_range,
            body: Box::pin(futures::stream::iter(chunks)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_name() {
        assert_eq!(operation_name("query jobs($cursor: Cursor) { x }"), "jobs");
        assert_eq!(operation_name("\n  mutation createPaste($files: [Upload!]!) {"), "createPaste");
        assert_eq!(operation_name("query profile {"), "profile");
    }

    #[test]
    fn test_range_server() {
        let server = RangeServer::new(b"abcdef");
        assert_eq!(
            server.respond(Some(2)),
            (206, Some("bytes 2-5/*".to_string()), b"cdef".to_vec())
        );
        assert_eq!(server.respond(Some(6)).0, 416);
        assert_eq!(server.respond(None), (200, None, b"abcdef".to_vec()));
    }
}
