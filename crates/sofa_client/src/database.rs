//! Database handle.
//!
//! A [`Database`] is a cheap, cloneable handle: it owns no documents and
//! performs no I/O when constructed. It is the factory for documents, bulk
//! operations, views and the security object of one database.

use crate::bulk::BulkOperation;
use crate::changes::{self, ChangeEvent, ChangesOptions};
use crate::design::DesignDocument;
use crate::document::Document;
use crate::error::{ClientError, ClientResult};
use crate::find::{self, FindOptions};
use crate::remote::{ErrorContext, ErrorRule, Remote};
use crate::security::SecurityDocument;
use crate::view::{DocsQuery, View};
use futures::Stream;
use serde::Deserialize;
use serde_json::Value;
use sofa_protocol::{
    BulkDocStatus, BulkDocsRequest, ChangesResponse, FindRequest, FindResponse, HttpRequest,
    JsonObject, Method, Params,
};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

const DATABASE_RULES: &[ErrorRule] = &[
    ErrorRule::new(401, "Read privilege required for database '{db}'"),
    ErrorRule::new(403, "Read privilege required for database '{db}'"),
    ErrorRule::new(404, "The database '{db}' does not exist."),
];

const DELETE_RULES: &[ErrorRule] = &[
    ErrorRule::new(400, "Invalid database name '{db}'"),
    ErrorRule::new(401, "CouchDB Server Administrator privileges required"),
    ErrorRule::new(403, "CouchDB Server Administrator privileges required"),
    ErrorRule::new(404, "The database '{db}' does not exist."),
];

const BULK_RULES: &[ErrorRule] = &[
    ErrorRule::new(400, "The request provided invalid JSON data"),
    ErrorRule::new(401, "Write privileges required for database '{db}'"),
    ErrorRule::new(403, "Write privileges required for database '{db}'"),
    ErrorRule::new(417, "At least one document was rejected by the validation function"),
];

const FIND_RULES: &[ErrorRule] = &[
    ErrorRule::new(400, "Invalid request"),
    ErrorRule::new(401, "Read permission required"),
    ErrorRule::new(403, "Read permission required"),
    ErrorRule::new(404, "Requested database not found"),
];

const INDEX_RULES: &[ErrorRule] = &[
    ErrorRule::new(400, "Invalid request"),
    ErrorRule::new(401, "Admin permission required"),
    ErrorRule::new(403, "Admin permission required"),
    ErrorRule::new(404, "Database not found"),
];

const CHANGES_RULES: &[ErrorRule] = &[
    ErrorRule::new(400, "Bad request"),
    ErrorRule::new(401, "Read privilege required for database '{db}'"),
    ErrorRule::new(403, "Read privilege required for database '{db}'"),
    ErrorRule::new(404, "The database '{db}' does not exist."),
];

const PURGE_RULES: &[ErrorRule] = &[
    ErrorRule::new(400, "Invalid database name or JSON payload"),
    ErrorRule::new(401, "Write privileges required for database '{db}'"),
    ErrorRule::new(403, "Write privileges required for database '{db}'"),
    ErrorRule::new(415, "Bad Content-Type value"),
];

/// Database statistics returned by `GET /{db}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DatabaseInfo {
    /// Database name.
    pub db_name: String,
    /// Number of live documents.
    #[serde(default)]
    pub doc_count: u64,
    /// Number of tombstones.
    #[serde(default)]
    pub doc_del_count: u64,
    /// Current update sequence.
    #[serde(default)]
    pub update_seq: Value,
    /// Every other field of the response.
    #[serde(flatten)]
    pub extra: JsonObject,
}

/// Handle to one database of a server.
#[derive(Clone)]
pub struct Database {
    remote: Arc<Remote>,
    id: String,
}

impl Database {
    pub(crate) fn new(remote: Arc<Remote>, id: impl Into<String>) -> Self {
        Self {
            remote,
            id: id.into(),
        }
    }

    /// Returns the database name.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn remote(&self) -> &Remote {
        &self.remote
    }

    /// True if the database exists on the server.
    pub async fn exists(&self) -> ClientResult<bool> {
        let request = HttpRequest::new(Method::Head, [self.id.as_str()]);
        self.remote
            .exists(request, &self.error_context(), DATABASE_RULES)
            .await
    }

    /// Returns the database statistics.
    pub async fn info(&self) -> ClientResult<DatabaseInfo> {
        let request = HttpRequest::new(Method::Get, [self.id.as_str()]);
        self.remote
            .json(request, &self.error_context(), DATABASE_RULES)
            .await
    }

    /// Number of live documents.
    pub async fn len(&self) -> ClientResult<u64> {
        Ok(self.info().await?.doc_count)
    }

    /// Deletes the database and every document in it.
    pub async fn delete(&self) -> ClientResult<()> {
        let request = HttpRequest::new(Method::Delete, [self.id.as_str()]);
        self.remote
            .send(request, &self.error_context(), DELETE_RULES)
            .await?;
        Ok(())
    }

    /// Creates a local document handle. No I/O.
    pub fn document(&self, id: impl Into<String>) -> Document {
        Document::new(self, id)
    }

    /// Creates a local document that must not exist on the server yet.
    ///
    /// With `exists_ok` the current server body is loaded if there is one.
    /// Otherwise an existing document fails with [`ClientError::Conflict`].
    /// The returned document is not saved.
    pub async fn create(
        &self,
        id: impl Into<String>,
        exists_ok: bool,
        data: Option<JsonObject>,
    ) -> ClientResult<Document> {
        let id: String = id.into();
        let mut document = Document::from_object(self, id.clone(), data.unwrap_or_default());

        if exists_ok {
            match document.fetch(true, None).await {
                Ok(()) | Err(ClientError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        } else if document.exists_on_server().await? {
            return Err(ClientError::Conflict(format!(
                "The document '{}' does already exist in the database '{}'",
                id, self.id
            )));
        }
        Ok(document)
    }

    /// Fetches a document.
    ///
    /// A missing document fails with [`ClientError::NotFound`] unless a
    /// `default` body is given, in which case an unsaved document holding
    /// that body is returned.
    pub async fn get(
        &self,
        id: impl Into<String>,
        default: Option<JsonObject>,
        rev: Option<&str>,
    ) -> ClientResult<Document> {
        let id: String = id.into();
        let mut document = Document::new(self, id.clone());
        match document.fetch(true, rev).await {
            Ok(()) => Ok(document),
            Err(ClientError::NotFound(message)) => match default {
                Some(data) => Ok(Document::from_object(self, id, data)),
                None => Err(ClientError::NotFound(message)),
            },
            Err(e) => Err(e),
        }
    }

    /// True if a document with `id` exists.
    pub async fn contains(&self, id: impl Into<String>) -> ClientResult<bool> {
        Document::new(self, id).exists_on_server().await
    }

    /// Returns every document id, design documents included.
    pub async fn keys(&self) -> ClientResult<Vec<String>> {
        self.all_docs().ids(None, None, Params::new()).await
    }

    /// Returns documents of the database. See [`View::docs`].
    pub async fn docs(&self, query: DocsQuery) -> ClientResult<Vec<Document>> {
        self.all_docs().docs(query).await
    }

    /// Returns every regular document.
    pub async fn values(&self) -> ClientResult<Vec<Document>> {
        self.docs(DocsQuery::new()).await
    }

    /// The `_all_docs` index.
    pub fn all_docs(&self) -> View {
        View::all_docs(self)
    }

    /// A view of a design document. No I/O.
    pub fn view(&self, design_doc: impl Into<String>, view: impl Into<String>) -> View {
        View::design(self, design_doc, view)
    }

    /// Creates a local design document, loading it when `exists_ok` is set.
    ///
    /// An existing design document fails with [`ClientError::Conflict`]
    /// unless `exists_ok` is set. The design document is not saved.
    pub async fn design_doc(&self, name: &str, exists_ok: bool) -> ClientResult<DesignDocument> {
        let mut ddoc = DesignDocument::new(self, name);

        if exists_ok {
            match ddoc.fetch(true).await {
                Ok(()) | Err(ClientError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        } else if ddoc.exists_on_server().await? {
            return Err(ClientError::Conflict(format!(
                "The design document '{}' does already exist in the database '{}'",
                ddoc.id(),
                self.id
            )));
        }
        Ok(ddoc)
    }

    /// Fetches the security object.
    pub async fn security(&self) -> ClientResult<SecurityDocument> {
        let mut security = SecurityDocument::new(self);
        security.fetch(true).await?;
        Ok(security)
    }

    /// Creates an index with `POST /{db}/_index`.
    pub async fn index(&self, definition: Value) -> ClientResult<JsonObject> {
        let request =
            HttpRequest::new(Method::Post, [self.id.as_str(), "_index"]).with_json(&definition)?;
        self.remote
            .json(request, &self.error_context(), INDEX_RULES)
            .await
    }

    /// Streams the documents matching a Mango `selector`.
    ///
    /// Without an explicit limit, pages of
    /// [`find_page_size`](crate::ClientConfig::find_page_size) documents are
    /// requested until the server returns a short page. The `fields`
    /// option is rejected with [`ClientError::InvalidArgument`], as partial
    /// bodies cannot be cached.
    pub fn find(
        &self,
        selector: Value,
        options: FindOptions,
    ) -> ClientResult<impl Stream<Item = ClientResult<Document>>> {
        find::stream(self.clone(), selector, options)
    }

    /// Streams change events. See [`ChangesOptions`].
    pub fn changes(&self, options: ChangesOptions) -> impl Stream<Item = ClientResult<ChangeEvent>> {
        changes::stream(self.clone(), options)
    }

    /// Permanently removes revisions with `POST /{db}/_purge`.
    pub async fn purge(&self, revisions: BTreeMap<String, Vec<String>>) -> ClientResult<JsonObject> {
        let request =
            HttpRequest::new(Method::Post, [self.id.as_str(), "_purge"]).with_json(&revisions)?;
        self.remote
            .json(request, &self.error_context(), PURGE_RULES)
            .await
    }

    /// Starts an empty bulk operation.
    pub fn bulk(&self) -> BulkOperation {
        BulkOperation::new(self)
    }

    /// Starts a bulk operation holding a fresh document per id. No I/O.
    pub fn create_docs<I, S>(&self, ids: I) -> BulkOperation
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let docs = ids.into_iter().map(|id| Document::new(self, id)).collect();
        BulkOperation::with_documents(self, docs)
    }

    /// Starts a bulk operation over the current server state of `ids`.
    ///
    /// Missing ids fail with [`ClientError::NotFound`] unless `create` is
    /// set, in which case they are staged as fresh documents.
    pub async fn update_docs<I, S>(&self, ids: I, create: bool) -> ClientResult<BulkOperation>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids: Vec<String> = ids.into_iter().map(Into::into).collect();
        let docs = self
            .docs(DocsQuery::new().ids(ids).create(create))
            .await?;
        Ok(BulkOperation::with_documents(self, docs))
    }

    pub(crate) async fn bulk_docs(&self, docs: Vec<JsonObject>) -> ClientResult<Vec<BulkDocStatus>> {
        let request = HttpRequest::new(Method::Post, [self.id.as_str(), "_bulk_docs"])
            .with_json(&BulkDocsRequest::new(docs))?;
        self.remote
            .json(request, &self.error_context(), BULK_RULES)
            .await
    }

    pub(crate) async fn find_page(&self, request: &FindRequest) -> ClientResult<FindResponse> {
        let request = HttpRequest::new(Method::Post, [self.id.as_str(), "_find"]).with_json(request)?;
        self.remote
            .json(request, &self.error_context(), FIND_RULES)
            .await
    }

    pub(crate) async fn changes_page(&self, params: Params) -> ClientResult<ChangesResponse> {
        let request =
            HttpRequest::new(Method::Get, [self.id.as_str(), "_changes"]).with_params(params);
        self.remote
            .json(request, &self.error_context(), CHANGES_RULES)
            .await
    }

    fn error_context(&self) -> ErrorContext {
        ErrorContext::new()
            .with("db", self.id.clone())
            .with("endpoint", format!("/{}", self.id))
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("id", &self.id)
            .field("remote", &self.remote)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use serde_json::json;

    fn object(value: Value) -> JsonObject {
        match value {
            Value::Object(map) => map,
            _ => JsonObject::new(),
        }
    }

    #[tokio::test]
    async fn handle_reports_existence() {
        let (_, db) = testing::database("handle").await;
        assert!(db.exists().await.unwrap());
        assert_eq!(db.info().await.unwrap().db_name, "handle");
        assert_eq!(db.len().await.unwrap(), 0);

        db.delete().await.unwrap();
        assert!(!db.exists().await.unwrap());
        assert!(db.info().await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn create_refuses_existing_documents() {
        let (_, db) = testing::filled_database().await;

        let err = db.create("foo", false, None).await.unwrap_err();
        assert!(err.is_conflict());

        let existing = db.create("foo", true, None).await.unwrap();
        assert!(existing.exists());
        assert_eq!(existing.get("bar2"), Some(&json!(3)));

        let fresh = db
            .create("new", false, Some(object(json!({"a": 1}))))
            .await
            .unwrap();
        assert!(!fresh.exists());
        assert_eq!(fresh.get("a"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn get_with_default() {
        let (_, db) = testing::filled_database().await;

        assert!(db.get("missing", None, None).await.unwrap_err().is_not_found());

        let doc = db
            .get("missing", Some(object(json!({"zebras": "rock"}))), None)
            .await
            .unwrap();
        assert_eq!(doc.get("zebras"), Some(&json!("rock")));
        assert!(!doc.exists());
        assert!(doc.is_dirty());
    }

    #[tokio::test]
    async fn contains_and_keys() {
        let (_, db) = testing::filled_database().await;
        assert!(db.contains("foo").await.unwrap());
        assert!(!db.contains("missing").await.unwrap());
        assert_eq!(db.keys().await.unwrap(), vec!["baz", "baz2", "foo", "foo2"]);
        assert_eq!(db.len().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn values_are_clean_documents() {
        let (_, db) = testing::filled_database().await;
        let docs = db.values().await.unwrap();
        assert_eq!(docs.len(), 4);
        assert!(docs.iter().all(|d| d.exists() && !d.is_dirty()));
    }

    #[tokio::test]
    async fn docs_with_empty_ids_is_empty() {
        let (server, db) = testing::filled_database().await;
        let before = server.log().len();
        let docs = db
            .docs(DocsQuery::new().ids(Vec::<String>::new()))
            .await
            .unwrap();
        assert!(docs.is_empty());
        assert_eq!(server.log().len(), before);
    }

    #[tokio::test]
    async fn security_is_fetched() {
        let (_, db) = testing::database("handle").await;
        let security = db.security().await.unwrap();
        assert!(!security.is_dirty());
        assert!(security.members().is_none());
    }

    #[tokio::test]
    async fn purge_removes_documents() {
        let (_, db) = testing::filled_database().await;
        let foo = db.get("foo", None, None).await.unwrap();

        let mut revisions = BTreeMap::new();
        revisions.insert("foo".to_string(), vec![foo.rev().unwrap().to_string()]);
        let response = db.purge(revisions).await.unwrap();
        assert!(response.contains_key("purged"));

        assert!(!db.contains("foo").await.unwrap());
    }
}
