//! Cursor-based pagination over GraphQL list queries.
//!
//! A [`Paginator`] pulls one page per [`Paginator::next_page`] call and stops
//! when the server hands back a `null` cursor. Any error ends the walk: a
//! broken page makes every later cursor suspect.

use std::future::Future;
use std::marker::PhantomData;

use futures::future::BoxFuture;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::client::{self, Client};
use crate::error::{Error, Result};
use crate::shutdown::ShutdownCoordinator;

/// Upper bound on pages per walk, so a cursor that never ends cannot hang us.
pub const MAX_PAGES: usize = 10_000;

/// One page of a collection as returned by sr.ht list queries.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    pub results: Vec<T>,
    pub cursor: Option<String>,
}

/// Lazy walk over every page of a collection.
pub struct Paginator<T, F> {
    fetch: F,
    cursor: Option<String>,
    pages: usize,
    exhausted: bool,
    _item: PhantomData<fn() -> T>,
}

impl<T, F, Fut> Paginator<T, F>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    /// Walk pages produced by `fetch(cursor)`, starting with no cursor.
    pub fn new(fetch: F) -> Self {
        Self {
            fetch,
            cursor: None,
            pages: 0,
            exhausted: false,
            _item: PhantomData,
        }
    }

    /// Fetch the next page, or `None` once the collection is exhausted.
    ///
    /// # Errors
    ///
    /// Returns the fetch error, after which the walk is over.
    pub async fn next_page(&mut self) -> Result<Option<Vec<T>>> {
        if self.exhausted {
            return Ok(None);
        }
        if self.pages >= MAX_PAGES {
            self.exhausted = true;
            return Err(Error::Other(format!(
                "pagination did not terminate after {MAX_PAGES} pages"
            )));
        }

        let page = match (self.fetch)(self.cursor.take()).await {
            Ok(page) => page,
            Err(e) => {
                self.exhausted = true;
                return Err(e);
            }
        };
        self.pages += 1;
        debug!(page = self.pages, items = page.results.len(), "fetched page");

        match page.cursor {
            Some(cursor) => self.cursor = Some(cursor),
            None => self.exhausted = true,
        }
        Ok(Some(page.results))
    }

    /// Drain every remaining page into one vector, in server order.
    ///
    /// # Errors
    ///
    /// Returns the first page error.
    pub async fn collect_all(mut self) -> Result<Vec<T>> {
        let mut items = Vec::new();
        while let Some(page) = self.next_page().await? {
            items.extend(page);
        }
        Ok(items)
    }
}

/// Future of one GraphQL page.
pub type PageFuture<'a, T> = BoxFuture<'a, Result<Page<T>>>;

/// Paginate a GraphQL query taking a `$cursor: Cursor` variable.
///
/// `pointer` is the JSON pointer of the page object inside `data`,
/// e.g. `/me/sshKeys` or `/jobs`.
pub fn graphql<'a, C, T>(
    client: &'a C,
    shutdown: &'a ShutdownCoordinator,
    query: &'a str,
    pointer: &'a str,
    variables: Value,
) -> Paginator<T, impl FnMut(Option<String>) -> PageFuture<'a, T> + 'a>
where
    C: Client,
    T: DeserializeOwned + Send + 'a,
{
    Paginator::new(move |cursor: Option<String>| -> PageFuture<'a, T> {
        let mut variables = variables.clone();
        if let Value::Object(map) = &mut variables {
            map.insert("cursor".to_string(), cursor.map_or(Value::Null, Value::String));
        }

        Box::pin(async move {
            let data: Value = client::query(client, shutdown, query, variables).await?;
            let page = data.pointer(pointer).cloned().ok_or_else(|| Error::GraphQl {
                messages: vec![format!("response has no page at {pointer}")],
            })?;
            Ok(serde_json::from_value(page)?)
        })
    })
}
