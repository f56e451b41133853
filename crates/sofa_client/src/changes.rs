//! Change events from the `_changes` feed.

use crate::database::Database;
use crate::document::Document;
use crate::error::ClientResult;
use futures::stream::{self, Stream};
use serde_json::Value;
use sofa_protocol::{ChangeRow, Params};
use std::collections::VecDeque;

/// Options of [`Database::changes`].
#[derive(Debug, Clone, Default)]
pub struct ChangesOptions {
    since: Option<Value>,
    include_docs: bool,
    limit: Option<u64>,
    follow: bool,
    params: Params,
}

impl ChangesOptions {
    /// All changes since the database was created, one request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts after `since`; `"now"` skips the history.
    #[must_use]
    pub fn since(mut self, since: impl Into<Value>) -> Self {
        self.since = Some(since.into());
        self
    }

    /// Embeds the document body in each change.
    #[must_use]
    pub fn include_docs(mut self, include: bool) -> Self {
        self.include_docs = include;
        self
    }

    /// Ends the stream after `limit` events.
    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Keeps long-polling for new changes instead of ending the stream.
    #[must_use]
    pub fn follow(mut self, follow: bool) -> Self {
        self.follow = follow;
        self
    }

    /// Adds raw `_changes` parameters (`filter`, `doc_ids`, ...).
    #[must_use]
    pub fn params(mut self, params: Params) -> Self {
        self.params.extend(params);
        self
    }
}

/// One entry of the changes feed.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    /// The document was created or modified.
    Changed(ChangedEvent),
    /// The document was deleted.
    Deleted(DeletedEvent),
}

impl ChangeEvent {
    fn from_row(database: &Database, row: ChangeRow) -> Self {
        if row.deleted {
            ChangeEvent::Deleted(DeletedEvent { row })
        } else {
            ChangeEvent::Changed(ChangedEvent {
                row,
                database: database.clone(),
            })
        }
    }

    /// Raw change row.
    pub fn row(&self) -> &ChangeRow {
        match self {
            ChangeEvent::Changed(event) => &event.row,
            ChangeEvent::Deleted(event) => &event.row,
        }
    }

    /// Id of the changed document.
    pub fn id(&self) -> &str {
        &self.row().id
    }

    /// Revision produced by the change.
    pub fn rev(&self) -> Option<&str> {
        first_rev(self.row())
    }

    /// Opaque sequence of the change.
    pub fn sequence(&self) -> &Value {
        &self.row().seq
    }
}

/// A created or modified document.
#[derive(Debug, Clone)]
pub struct ChangedEvent {
    row: ChangeRow,
    database: Database,
}

impl ChangedEvent {
    /// Id of the changed document.
    pub fn id(&self) -> &str {
        &self.row.id
    }

    /// Revision produced by the change.
    pub fn rev(&self) -> Option<&str> {
        first_rev(&self.row)
    }

    /// Opaque sequence of the change.
    pub fn sequence(&self) -> &Value {
        &self.row.seq
    }

    /// Raw change row.
    pub fn row(&self) -> &ChangeRow {
        &self.row
    }

    /// The document as of this change.
    ///
    /// Uses the embedded body when the feed included documents, otherwise
    /// fetches the announced revision.
    pub async fn doc(&self) -> ClientResult<Document> {
        match &self.row.doc {
            Some(body) => Ok(Document::from_server(&self.database, self.row.id.clone(), body.clone())),
            None => self.database.get(self.row.id.clone(), None, self.rev()).await,
        }
    }
}

/// A deleted document.
#[derive(Debug, Clone)]
pub struct DeletedEvent {
    row: ChangeRow,
}

impl DeletedEvent {
    /// Id of the deleted document.
    pub fn id(&self) -> &str {
        &self.row.id
    }

    /// Revision of the tombstone.
    pub fn rev(&self) -> Option<&str> {
        first_rev(&self.row)
    }

    /// Opaque sequence of the change.
    pub fn sequence(&self) -> &Value {
        &self.row.seq
    }

    /// Raw change row.
    pub fn row(&self) -> &ChangeRow {
        &self.row
    }
}

fn first_rev(row: &ChangeRow) -> Option<&str> {
    row.changes.first().map(|change| change.rev.as_str())
}

struct ChangesState {
    database: Database,
    params: Params,
    since: Option<Value>,
    remaining: Option<u64>,
    follow: bool,
    buffer: VecDeque<ChangeRow>,
    exhausted: bool,
}

pub(crate) fn stream(
    database: Database,
    options: ChangesOptions,
) -> impl Stream<Item = ClientResult<ChangeEvent>> {
    let ChangesOptions {
        since,
        include_docs,
        limit,
        follow,
        mut params,
    } = options;

    params.set("feed", if follow { "longpoll" } else { "normal" });
    if include_docs {
        params.set("include_docs", true);
    }

    let state = ChangesState {
        database,
        params,
        since,
        remaining: limit,
        follow,
        buffer: VecDeque::new(),
        exhausted: false,
    };
    stream::try_unfold(state, next_event)
}

async fn next_event(mut state: ChangesState) -> ClientResult<Option<(ChangeEvent, ChangesState)>> {
    loop {
        if state.remaining == Some(0) {
            return Ok(None);
        }
        if let Some(row) = state.buffer.pop_front() {
            if let Some(remaining) = state.remaining.as_mut() {
                *remaining -= 1;
            }
            let event = ChangeEvent::from_row(&state.database, row);
            return Ok(Some((event, state)));
        }
        if state.exhausted {
            return Ok(None);
        }

        let mut params = state.params.clone();
        if let Some(since) = &state.since {
            params.set("since", since_param(since));
        }
        if let Some(remaining) = state.remaining {
            params.set("limit", remaining);
        }

        let page = state.database.changes_page(params).await?;
        state.exhausted = !state.follow;
        state.since = Some(page.last_seq);
        state.buffer.extend(page.results);
    }
}

fn since_param(since: &Value) -> Value {
    match since {
        Value::String(_) => since.clone(),
        other => Value::String(other.to_string()),
    }
}
