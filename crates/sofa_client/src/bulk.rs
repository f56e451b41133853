//! Batched writes through `_bulk_docs`.
//!
//! A [`BulkOperation`] stages documents and writes every dirty one in a
//! single request on [`commit`](BulkOperation::commit). Per-document
//! failures are data, not errors: the caller inspects
//! [`ok`](BulkOperation::ok) and [`error`](BulkOperation::error) after the
//! commit. Only a failure of the batch request itself is returned as an
//! error.

use crate::database::Database;
use crate::document::Document;
use crate::error::{ClientError, ClientResult};
use futures::future::BoxFuture;
use sofa_protocol::{BulkDocStatus, JsonObject};
use std::fmt;
use tracing::debug;

/// Lifecycle of a bulk operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkState {
    /// Collecting documents.
    Staging,
    /// The batch was written; the outcome is available.
    Committed,
    /// The staged changes were dropped without a request.
    Aborted,
    /// The server answered with statuses that do not match the batch.
    Failed,
}

impl fmt::Display for BulkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BulkState::Staging => f.write_str("staging"),
            BulkState::Committed => f.write_str("committed"),
            BulkState::Aborted => f.write_str("aborted"),
            BulkState::Failed => f.write_str("failed"),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct BulkOutcome {
    response: Vec<BulkDocStatus>,
    ok: Vec<usize>,
    error: Vec<usize>,
}

/// A batch of documents written with one `_bulk_docs` request.
///
/// Document ids are unique within a batch. Clean documents are carried
/// along but never sent.
#[derive(Debug)]
pub struct BulkOperation {
    database: Database,
    docs: Vec<Document>,
    state: BulkState,
    outcome: Option<BulkOutcome>,
}

impl BulkOperation {
    /// Creates an empty batch for `database`.
    pub fn new(database: &Database) -> Self {
        Self::with_documents(database, Vec::new())
    }

    pub(crate) fn with_documents(database: &Database, docs: Vec<Document>) -> Self {
        Self {
            database: database.clone(),
            docs,
            state: BulkState::Staging,
            outcome: None,
        }
    }

    /// Returns the database.
    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Returns the lifecycle state.
    pub fn state(&self) -> BulkState {
        self.state
    }

    /// Stages a new document.
    ///
    /// Fails with [`ClientError::InvalidArgument`] if a document with the
    /// same id is already staged.
    pub fn create(&mut self, id: impl Into<String>, data: Option<JsonObject>) -> ClientResult<&mut Document> {
        let document = Document::from_object(&self.database, id, data.unwrap_or_default());
        self.append(document)
    }

    /// Stages an existing document.
    ///
    /// Fails with [`ClientError::InvalidArgument`] if a document with the
    /// same id is already staged.
    pub fn append(&mut self, document: Document) -> ClientResult<&mut Document> {
        self.ensure_staging()?;
        if self.docs.iter().any(|d| d.id() == document.id()) {
            return Err(ClientError::invalid_argument(format!(
                "There is already another Document instance for {} part of the BulkOperation",
                document.id()
            )));
        }

        let index = self.docs.len();
        self.docs.push(document);
        Ok(&mut self.docs[index])
    }

    /// Number of staged documents.
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    /// True if nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Returns the staged documents in staging order.
    pub fn documents(&self) -> &[Document] {
        &self.docs
    }

    /// Iterates over the staged documents.
    pub fn iter(&self) -> impl Iterator<Item = &Document> {
        self.docs.iter()
    }

    /// Iterates mutably over the staged documents.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Document> {
        self.docs.iter_mut()
    }

    /// Returns the staged document with `id`.
    pub fn get(&self, id: &str) -> Option<&Document> {
        self.docs.iter().find(|d| d.id() == id)
    }

    /// Returns the staged document with `id` for editing.
    pub fn get_mut(&mut self, id: &str) -> Option<&mut Document> {
        self.docs.iter_mut().find(|d| d.id() == id)
    }

    /// Writes every dirty document in one request.
    ///
    /// Nothing is sent if no document is dirty. Successful rows merge the
    /// new revision into their document; failed rows leave their document
    /// untouched.
    ///
    /// A request that got no usable answer leaves the batch staged so it can
    /// be committed again. A response whose statuses do not line up with the
    /// sent documents fails with [`ClientError::Protocol`] and closes the
    /// batch as [`BulkState::Failed`]; no document is updated.
    pub async fn commit(&mut self) -> ClientResult<()> {
        self.ensure_staging()?;

        let dirty: Vec<usize> = self
            .docs
            .iter()
            .enumerate()
            .filter(|(_, d)| d.is_dirty())
            .map(|(i, _)| i)
            .collect();

        let response = if dirty.is_empty() {
            Vec::new()
        } else {
            let bodies = dirty.iter().map(|&i| self.docs[i].outgoing_body()).collect();
            self.database.bulk_docs(bodies).await?
        };

        if response.len() != dirty.len() {
            self.state = BulkState::Failed;
            return Err(ClientError::protocol(format!(
                "bulk write returned {} statuses for {} documents",
                response.len(),
                dirty.len()
            )));
        }
        for (status, &index) in response.iter().zip(&dirty) {
            if status.id != self.docs[index].id() {
                self.state = BulkState::Failed;
                return Err(ClientError::protocol(format!(
                    "bulk write status for '{}' does not match the staged document '{}'",
                    status.id,
                    self.docs[index].id()
                )));
            }
        }

        let mut outcome = BulkOutcome::default();
        for (status, &index) in response.iter().zip(&dirty) {
            if status.is_ok() {
                self.docs[index].apply_write(status.rev.as_deref());
                outcome.ok.push(index);
            } else {
                outcome.error.push(index);
            }
        }

        debug!(
            db = %self.database.id(),
            staged = self.docs.len(),
            sent = dirty.len(),
            ok = outcome.ok.len(),
            failed = outcome.error.len(),
            "bulk write committed"
        );

        outcome.response = response;
        self.outcome = Some(outcome);
        self.state = BulkState::Committed;
        Ok(())
    }

    /// Drops the batch without a request.
    pub fn abort(&mut self) {
        if self.state == BulkState::Staging {
            debug!(db = %self.database.id(), staged = self.docs.len(), "bulk write aborted");
            self.state = BulkState::Aborted;
        }
    }

    /// Runs `body` against the batch, then commits it.
    ///
    /// If `body` fails the batch is aborted and the error returned; no
    /// request is made and the outcome stays unset.
    ///
    /// ```rust,ignore
    /// bulk.run(|batch| {
    ///     Box::pin(async move {
    ///         let doc = db.get("zebra", None, None).await?;
    ///         batch.append(doc)?.insert("stripes", 42);
    ///         Ok(())
    ///     })
    /// })
    /// .await?;
    /// ```
    pub async fn run<F>(&mut self, body: F) -> ClientResult<()>
    where
        F: for<'b> FnOnce(&'b mut Self) -> BoxFuture<'b, ClientResult<()>>,
    {
        if let Err(err) = body(self).await {
            self.abort();
            return Err(err);
        }
        self.commit().await
    }

    /// Raw per-document status rows; `None` until committed.
    pub fn response(&self) -> Option<&[BulkDocStatus]> {
        self.outcome.as_ref().map(|o| o.response.as_slice())
    }

    /// Documents written successfully; `None` until committed.
    pub fn ok(&self) -> Option<Vec<&Document>> {
        self.outcome
            .as_ref()
            .map(|o| o.ok.iter().map(|&i| &self.docs[i]).collect())
    }

    /// Documents the server rejected; `None` until committed.
    pub fn error(&self) -> Option<Vec<&Document>> {
        self.outcome
            .as_ref()
            .map(|o| o.error.iter().map(|&i| &self.docs[i]).collect())
    }

    /// Status rows of the rejected documents, paired with their document.
    pub fn failures(&self) -> Vec<(&Document, &BulkDocStatus)> {
        let Some(outcome) = &self.outcome else {
            return Vec::new();
        };
        outcome
            .response
            .iter()
            .filter(|status| !status.is_ok())
            .filter_map(|status| {
                self.docs
                    .iter()
                    .find(|d| d.id() == status.id)
                    .map(|d| (d, status))
            })
            .collect()
    }

    /// Unwraps the staged documents.
    pub fn into_documents(self) -> Vec<Document> {
        self.docs
    }

    fn ensure_staging(&self) -> ClientResult<()> {
        if self.state != BulkState::Staging {
            return Err(ClientError::invalid_operation(format!(
                "bulk operation on '{}' is already {}",
                self.database.id(),
                self.state
            )));
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a mut BulkOperation {
    type Item = &'a mut Document;
    type IntoIter = std::slice::IterMut<'a, Document>;

    fn into_iter(self) -> Self::IntoIter {
        self.docs.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use crate::{ClientConfig, CouchSession, LoopbackClient};
    use serde_json::{json, Value};
    use sofa_protocol::{HttpRequest, HttpResponse, LoopbackServer};
    use sofa_testkit::MemoryServer;
    use std::sync::Arc;

    fn object(value: Value) -> JsonObject {
        match value {
            Value::Object(map) => map,
            _ => JsonObject::new(),
        }
    }

    #[tokio::test]
    async fn create_docs_writes_fresh_documents() {
        let (server, db) = testing::database("bulk").await;
        let mut bulk = db.create_docs(["foo", "baz"]);
        assert_eq!(bulk.len(), 2);

        bulk.commit().await.unwrap();
        assert_eq!(bulk.state(), BulkState::Committed);
        assert_eq!(bulk.response().map(|r| r.len()), Some(2));
        assert_eq!(server.log().count("POST", "/bulk/_bulk_docs"), 1);

        let mut keys = db.keys().await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["baz", "foo"]);
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected() {
        let (_, db) = testing::database("bulk").await;
        let mut bulk = db.bulk();
        bulk.create("foo", Some(object(json!({"counter": 42}))))
            .unwrap();
        bulk.create("baz", None).unwrap();

        let err = bulk.create("foo", None).unwrap_err();
        assert!(matches!(err, ClientError::InvalidArgument(_)));
        assert_eq!(bulk.len(), 2);

        bulk.commit().await.unwrap();
        let foo = db.get("foo", None, None).await.unwrap();
        assert_eq!(foo.get("counter"), Some(&json!(42)));
    }

    #[tokio::test]
    async fn duplicate_appends_are_rejected() {
        let (_, db) = testing::database("bulk").await;
        let mut bulk = db.bulk();
        bulk.append(db.document("foo")).unwrap();

        let err = bulk.append(db.document("foo")).unwrap_err();
        assert!(matches!(err, ClientError::InvalidArgument(_)));
        assert_eq!(bulk.len(), 1);
    }

    #[tokio::test]
    async fn run_body_can_await() {
        let (server, db) = testing::filled_database().await;
        let mut bulk = db.bulk();
        let source = db.clone();

        bulk.run(|batch| {
            Box::pin(async move {
                let foo = source.get("foo", None, None).await?;
                batch.append(foo)?.insert("awaited", true);
                Ok::<_, ClientError>(())
            })
        })
        .await
        .unwrap();

        assert_eq!(bulk.state(), BulkState::Committed);
        assert_eq!(bulk.ok().map(|d| d.len()), Some(1));
        let stored = server.document("filled", "foo").unwrap();
        assert_eq!(stored.get("awaited"), Some(&json!(true)));
    }

    /// Rewrites `_bulk_docs` answers of the wrapped server.
    struct MangledBulk {
        inner: MemoryServer,
        truncate: bool,
    }

    impl LoopbackServer for MangledBulk {
        fn handle(&self, request: &HttpRequest) -> HttpResponse {
            let response = self.inner.handle(request);
            if request.segments.last().map(String::as_str) != Some("_bulk_docs") {
                return response;
            }
            let Ok(mut statuses) = response.decode::<Vec<BulkDocStatus>>() else {
                return response;
            };
            if self.truncate {
                statuses.pop();
            } else {
                statuses.reverse();
            }
            HttpResponse::json(response.status, &statuses)
        }
    }

    async fn mangled_database(truncate: bool) -> Database {
        let server = MangledBulk {
            inner: MemoryServer::default(),
            truncate,
        };
        let client = LoopbackClient::new(Arc::new(server));
        let couch = CouchSession::with_client(ClientConfig::default(), Arc::new(client));
        couch.create("mangled", false).await.unwrap()
    }

    #[tokio::test]
    async fn reordered_statuses_fail_the_batch() {
        let db = mangled_database(false).await;
        let mut bulk = db.create_docs(["a", "b"]);

        let err = bulk.commit().await.unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
        assert_eq!(bulk.state(), BulkState::Failed);
        assert!(bulk.response().is_none());
        assert!(bulk.ok().is_none());
        assert!(bulk.iter().all(|doc| doc.rev().is_none() && doc.is_dirty()));

        assert!(matches!(
            bulk.commit().await,
            Err(ClientError::InvalidOperation(_))
        ));
    }

    #[tokio::test]
    async fn short_response_fails_the_batch() {
        let db = mangled_database(true).await;
        let mut bulk = db.create_docs(["a", "b"]);

        let err = bulk.commit().await.unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
        assert_eq!(bulk.state(), BulkState::Failed);
        assert!(bulk.error().is_none());
        assert!(bulk.iter().all(|doc| doc.rev().is_none()));
    }

    #[tokio::test]
    async fn clean_batch_sends_nothing() {
        let (server, db) = testing::filled_database().await;
        let mut bulk = db.update_docs(["foo", "baz"], false).await.unwrap();
        let before = server.log().len();

        bulk.commit().await.unwrap();
        assert_eq!(server.log().len(), before);
        assert_eq!(bulk.response(), Some(&[][..]));
        assert_eq!(bulk.ok().map(|d| d.len()), Some(0));
    }

    #[tokio::test]
    async fn partial_failure_is_data() {
        let (_, db) = testing::filled_database().await;
        let mut racing = db.get("foo", None, None).await.unwrap();
        racing.insert("something", 42);

        let mut bulk = db.update_docs(["foo", "baz"], false).await.unwrap();
        racing.save().await.unwrap();
        for doc in &mut bulk {
            doc.insert("thing", 42);
        }
        bulk.commit().await.unwrap();

        assert_eq!(bulk.response().map(|r| r.len()), Some(2));

        let ok = bulk.ok().unwrap();
        assert_eq!(ok.len(), 1);
        assert_eq!(ok[0].id(), "baz");
        assert_eq!(ok[0].get("thing"), Some(&json!(42)));
        assert!(ok[0].rev().unwrap().starts_with("2-"));
        assert!(!ok[0].is_dirty());

        let error = bulk.error().unwrap();
        assert_eq!(error.len(), 1);
        assert_eq!(error[0].id(), "foo");
        assert!(error[0].rev().unwrap().starts_with("1-"));
        assert!(!error[0].contains_key("something"));
        assert!(error[0].is_dirty());

        let failures = bulk.failures();
        assert_eq!(failures[0].1.error.as_deref(), Some("conflict"));
    }

    #[tokio::test]
    async fn failing_body_sends_nothing() {
        let (server, db) = testing::database("bulk").await;
        let mut doc = db.document("foo");
        doc.insert("zebras", "awesome");
        let before = server.log().len();

        let mut bulk = db.bulk();
        let result = bulk
            .run(|bulk| {
                Box::pin(async move {
                    bulk.append(doc)?;
                    Err::<(), _>(ClientError::invalid_operation("simulated failure"))
                })
            })
            .await;

        assert!(result.is_err());
        assert_eq!(bulk.state(), BulkState::Aborted);
        assert!(bulk.response().is_none());
        assert!(bulk.ok().is_none());
        assert!(bulk.error().is_none());
        assert_eq!(server.log().len(), before);
        let stored = db.create("foo", false, None).await.unwrap();
        assert!(!stored.contains_key("zebras"));
    }

    #[tokio::test]
    async fn committed_batch_is_closed() {
        let (_, db) = testing::database("bulk").await;
        let mut bulk = db.bulk();
        bulk.commit().await.unwrap();

        assert!(matches!(
            bulk.create("late", None),
            Err(ClientError::InvalidOperation(_))
        ));
        assert!(matches!(
            bulk.commit().await,
            Err(ClientError::InvalidOperation(_))
        ));

        let mut aborted = db.bulk();
        aborted.abort();
        assert_eq!(aborted.state(), BulkState::Aborted);
        assert!(aborted.response().is_none());
        assert!(aborted.ok().is_none());
        assert!(aborted.error().is_none());
    }
}
