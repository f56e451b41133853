//! Mango queries with bookmark pagination.

use crate::database::Database;
use crate::document::Document;
use crate::error::{ClientError, ClientResult};
use futures::stream::{self, Stream};
use serde_json::Value;
use sofa_protocol::{FindRequest, JsonObject, ID_KEY};
use std::collections::VecDeque;

/// Options of a [`Database::find`] query besides the selector.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    limit: Option<u64>,
    extra: JsonObject,
}

impl FindOptions {
    /// No limit, no extra options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns at most `limit` documents with a single request.
    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the sort order, e.g. `[{"bar2": "asc"}]`.
    #[must_use]
    pub fn sort(self, sort: Value) -> Self {
        self.option("sort", sort)
    }

    /// Sets any other `_find` option.
    #[must_use]
    pub fn option(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(name.into(), value.into());
        self
    }
}

struct FindState {
    database: Database,
    request: FindRequest,
    page_size: u64,
    single_page: bool,
    buffer: VecDeque<JsonObject>,
    exhausted: bool,
}

pub(crate) fn stream(
    database: Database,
    selector: Value,
    options: FindOptions,
) -> ClientResult<impl Stream<Item = ClientResult<Document>>> {
    let FindOptions { limit, extra } = options;
    if extra.contains_key("fields") {
        return Err(ClientError::invalid_argument(
            "The fields parameter isn't supported",
        ));
    }

    let page_size = limit.unwrap_or(database.remote().config().find_page_size);
    let mut request = FindRequest::new(selector);
    request.limit = Some(page_size);
    request.extra = extra;

    let state = FindState {
        database,
        request,
        page_size,
        single_page: limit.is_some(),
        buffer: VecDeque::new(),
        exhausted: false,
    };
    Ok(stream::try_unfold(state, next_document))
}

async fn next_document(mut state: FindState) -> ClientResult<Option<(Document, FindState)>> {
    loop {
        if let Some(body) = state.buffer.pop_front() {
            let id = body
                .get(ID_KEY)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| ClientError::protocol("_find returned a document without _id"))?;
            let document = Document::from_server(&state.database, id, body);
            return Ok(Some((document, state)));
        }
        if state.exhausted {
            return Ok(None);
        }

        let page = state.database.find_page(&state.request).await?;
        let short_page = (page.docs.len() as u64) < state.page_size;
        state.exhausted = state.single_page || short_page || page.bookmark.is_none();
        state.request.bookmark = page.bookmark;
        state.buffer.extend(page.docs);
    }
}
