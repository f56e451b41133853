//! Cached documents with optimistic concurrency control.
//!
//! A [`Document`] is a local copy of a server document. It remembers a
//! fingerprint of the body it last synchronized, so edits are detected
//! without tracking individual mutations. The revision token (`_rev`) is
//! the only concurrency control: the server rejects writes carrying a stale
//! revision and the client never resolves conflicts on its own.

use crate::attachment::Attachment;
use crate::database::Database;
use crate::error::{ClientError, ClientResult, ErrorKind};
use crate::fingerprint::Fingerprint;
use crate::remote::{ErrorContext, ErrorRule};
use serde_json::Value;
use sofa_protocol::{
    is_reserved, HttpRequest, JsonObject, Method, Params, WriteResponse, DELETED_KEY, ID_KEY,
    REV_KEY,
};
use std::fmt;
use tracing::trace;

/// Id of the per-database security object.
pub const SECURITY_ID: &str = "_security";

const FETCH_RULES: &[ErrorRule] = &[
    ErrorRule::new(400, "The format of the request or revision was invalid"),
    ErrorRule::new(401, "Read privilege required for document '{id}'"),
    ErrorRule::new(403, "Read privilege required for document '{id}'"),
    ErrorRule::new(404, "Document {id} was not found"),
];

const SAVE_RULES: &[ErrorRule] = &[
    ErrorRule::new(400, "Invalid request body or parameters for document '{id}'"),
    ErrorRule::new(401, "Write privileges required to save document '{id}'"),
    ErrorRule::new(403, "Write privileges required to save document '{id}'"),
    ErrorRule::new(404, "Specified database or document ID doesn't exists ({endpoint})"),
    ErrorRule::new(
        409,
        "Document '{id}' with revision '{rev}' conflicts with the server revision",
    ),
];

const SECURITY_SAVE_RULES: &[ErrorRule] = &[
    ErrorRule::new(400, "Invalid request body or parameters for document '{id}'"),
    ErrorRule::new(401, "Write privileges required to save document '{id}'"),
    ErrorRule::new(403, "Write privileges required to save document '{id}'"),
    ErrorRule::new(404, "Specified database or document ID doesn't exists ({endpoint})"),
    ErrorRule::with_kind(500, "You are not a database or server admin", ErrorKind::Forbidden),
];

const DELETE_RULES: &[ErrorRule] = &[
    ErrorRule::new(400, "Invalid request body or parameters"),
    ErrorRule::new(401, "Write privileges required to delete document '{id}'"),
    ErrorRule::new(403, "Write privileges required to delete document '{id}'"),
    ErrorRule::new(404, "Specified database or document ID doesn't exists ({endpoint})"),
    ErrorRule::new(409, "Specified revision ({rev}) is not the latest for target document '{id}'"),
];

const COPY_RULES: &[ErrorRule] = &[
    ErrorRule::new(400, "Invalid request body or parameters"),
    ErrorRule::new(401, "Read or write privileges required"),
    ErrorRule::new(403, "Read or write privileges required"),
    ErrorRule::new(404, "Specified database, document ID or revision doesn't exists"),
    ErrorRule::new(409, "Document with the specified ID already exists"),
];

const INFO_RULES: &[ErrorRule] = &[
    ErrorRule::new(401, "Read privilege required for document '{id}'"),
    ErrorRule::new(403, "Read privilege required for document '{id}'"),
    ErrorRule::new(404, "Document {id} was not found"),
];

/// Where a document lives on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DocumentKind {
    /// `/{db}/{id}`, with `_design/` and `_local/` ids split into two segments.
    Regular,
    /// `/{db}/_design/{name}`; the id carries the `_design/` prefix.
    Design,
    /// `/{db}/_security`; the body carries no `_id`.
    Security,
}

/// Result of a successful copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyResponse {
    /// Id of the new document.
    pub id: String,
    /// Revision of the new document.
    pub rev: String,
    /// Raw `ETag` header of the response.
    pub etag: Option<String>,
}

/// Current server revision of a document, as reported by a `HEAD` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentInfo {
    /// Document id.
    pub id: String,
    /// Current revision.
    pub rev: String,
}

/// Local cached copy of a server document.
///
/// Constructing a document never performs I/O. The body behaves like a JSON
/// object; any mutation makes the document dirty until the next successful
/// [`fetch`](Document::fetch), [`save`](Document::save) or
/// [`delete`](Document::delete).
#[derive(Clone)]
pub struct Document {
    database: Database,
    id: String,
    kind: DocumentKind,
    data: JsonObject,
    fingerprint: Option<Fingerprint>,
    // The last synchronized body was a tombstone.
    synced_tombstone: bool,
}

impl Document {
    /// Creates an empty document containing only `_id`.
    pub fn new(database: &Database, id: impl Into<String>) -> Self {
        Self::from_object(database, id, JsonObject::new())
    }

    /// Creates a document with an initial body.
    ///
    /// Fails with [`ClientError::InvalidType`] if `data` is not a JSON object.
    pub fn with_data(database: &Database, id: impl Into<String>, data: Value) -> ClientResult<Self> {
        match data {
            Value::Object(map) => Ok(Self::from_object(database, id, map)),
            other => Err(ClientError::InvalidType(format!(
                "document data must be a JSON object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    /// Creates a document from an initial body. `_id` is overwritten with `id`.
    pub fn from_object(database: &Database, id: impl Into<String>, data: JsonObject) -> Self {
        Self::with_kind(database, id, DocumentKind::Regular, data)
    }

    pub(crate) fn with_kind(
        database: &Database,
        id: impl Into<String>,
        kind: DocumentKind,
        mut data: JsonObject,
    ) -> Self {
        let id = id.into();
        match kind {
            DocumentKind::Security => {
                data.remove(ID_KEY);
            }
            DocumentKind::Regular | DocumentKind::Design => {
                data.insert(ID_KEY.into(), Value::String(id.clone()));
            }
        }

        Self {
            database: database.clone(),
            id,
            kind,
            data,
            fingerprint: None,
            synced_tombstone: false,
        }
    }

    /// Creates a clean document from a body the server just returned.
    pub(crate) fn from_server(database: &Database, id: impl Into<String>, body: JsonObject) -> Self {
        let mut document = Self::with_kind(database, id, DocumentKind::Regular, JsonObject::new());
        document.update_cache(body);
        document
    }

    /// Returns the document id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the database the document belongs to.
    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Returns the local revision, if the document was ever synchronized.
    pub fn rev(&self) -> Option<&str> {
        self.data.get(REV_KEY).and_then(Value::as_str)
    }

    /// Overrides the local revision, e.g. to force a write after a conflict.
    pub fn set_rev(&mut self, rev: impl Into<String>) {
        self.data.insert(REV_KEY.into(), Value::String(rev.into()));
    }

    /// True if the document was synchronized and is not a tombstone.
    pub fn exists(&self) -> bool {
        self.data.contains_key(REV_KEY) && !self.data.contains_key(DELETED_KEY)
    }

    /// True if the body differs from the last synchronized body, or was never synchronized.
    pub fn is_dirty(&self) -> bool {
        match self.fingerprint {
            Some(fingerprint) => fingerprint != Fingerprint::of(&self.data),
            None => true,
        }
    }

    /// True for a body that holds nothing but the id.
    pub fn is_fresh(&self) -> bool {
        match self.kind {
            DocumentKind::Security => self.data.is_empty(),
            DocumentKind::Regular | DocumentKind::Design => {
                self.data.len() == 1 && self.data.contains_key(ID_KEY)
            }
        }
    }

    /// Returns the full body, or `None` if the document does not exist.
    pub fn data(&self) -> Option<&JsonObject> {
        self.exists().then_some(&self.data)
    }

    /// Returns the user keys of the body; empty if the document does not exist.
    pub fn json(&self) -> JsonObject {
        if !self.exists() {
            return JsonObject::new();
        }
        self.data
            .iter()
            .filter(|(key, _)| !is_reserved(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Returns the raw local body regardless of server state.
    pub fn body(&self) -> &JsonObject {
        &self.data
    }

    /// Returns a value of the body.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Returns a mutable value of the body.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.data.get_mut(key)
    }

    /// Sets a value, returning the previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.data.insert(key.into(), value.into())
    }

    /// Removes a value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    /// True if the body has `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Returns the value for `key`, inserting `default` first if absent.
    pub fn setdefault(&mut self, key: impl Into<String>, default: impl Into<Value>) -> &mut Value {
        self.data.entry(key.into()).or_insert_with(|| default.into())
    }

    /// Copies every entry of `items` into the body.
    pub fn update<I, K>(&mut self, items: I)
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        for (key, value) in items {
            self.data.insert(key.into(), value);
        }
    }

    /// Removes every key except `_id` and `_rev`.
    pub fn clear(&mut self) {
        self.data
            .retain(|key, _| key.as_str() == ID_KEY || key.as_str() == REV_KEY);
    }

    /// Iterates over the keys of the body.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.data.keys()
    }

    /// Iterates over the values of the body.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.data.values()
    }

    /// Iterates over the entries of the body.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.data.iter()
    }

    /// Number of keys in the body, reserved keys included.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if the body has no keys at all.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns a handle to an attachment of this document. No I/O.
    pub fn attachment(&mut self, name: impl Into<String>) -> Attachment<'_> {
        Attachment::new(self, name)
    }

    /// Retrieves the document from the server, replacing the local body.
    ///
    /// Fails with [`ClientError::Conflict`] if the body has unsaved edits,
    /// unless `discard_changes` is set or the document is fresh. A specific
    /// historical revision can be requested with `rev`.
    pub async fn fetch(&mut self, discard_changes: bool, rev: Option<&str>) -> ClientResult<()> {
        self.ensure_clean("fetch", discard_changes)?;

        let mut params = Params::new();
        if let Some(rev) = rev {
            params.set("rev", rev);
        }
        let request = HttpRequest::new(Method::Get, self.segments()).with_params(params);
        let body: JsonObject = self
            .database
            .remote()
            .json(request, &self.error_context(), FETCH_RULES)
            .await?;

        self.update_cache(body);
        Ok(())
    }

    /// Writes the body to the server if it is dirty.
    ///
    /// Returns `None` without a request when the document is clean. On
    /// success the new revision is merged into the body. Saving a dirty
    /// tombstone brings the document back to life.
    pub async fn save(&mut self) -> ClientResult<Option<WriteResponse>> {
        let rules = match self.kind {
            DocumentKind::Security => SECURITY_SAVE_RULES,
            DocumentKind::Regular | DocumentKind::Design => SAVE_RULES,
        };

        if !self.is_dirty() {
            trace!(db = %self.database.id(), id = %self.id, "document is clean, skipping save");
            return Ok(None);
        }

        let request = HttpRequest::new(Method::Put, self.segments()).with_json(&self.outgoing_body())?;
        let response: WriteResponse = self
            .database
            .remote()
            .json(request, &self.error_context(), rules)
            .await?;

        self.apply_write(response.rev.as_deref());
        Ok(Some(response))
    }

    /// Deletes the document on the server.
    ///
    /// Same dirty precondition as [`fetch`](Document::fetch). On success the
    /// body becomes the tombstone: `_id`, the new `_rev` and `_deleted`.
    /// The security object cannot be deleted and fails with
    /// [`ClientError::InvalidOperation`].
    pub async fn delete(&mut self, discard_changes: bool) -> ClientResult<()> {
        if self.kind == DocumentKind::Security {
            return Err(ClientError::invalid_operation(format!(
                "The security object of database '{}' cannot be deleted",
                self.database.id()
            )));
        }
        self.ensure_clean("delete", discard_changes)?;

        let rev = self.rev().map(str::to_string).ok_or_else(|| {
            ClientError::NotFound(format!(
                "Document '{}' has no revision to delete; it was never fetched or saved",
                self.id
            ))
        })?;

        let request = HttpRequest::new(Method::Delete, self.segments())
            .with_params(Params::new().with("rev", rev));
        let response: WriteResponse = self
            .database
            .remote()
            .json(request, &self.error_context(), DELETE_RULES)
            .await?;
        let new_rev = response.rev.ok_or_else(|| {
            ClientError::protocol(format!("delete of '{}' returned no revision", self.id))
        })?;

        let mut tombstone = JsonObject::new();
        if self.kind != DocumentKind::Security {
            tombstone.insert(ID_KEY.into(), Value::String(self.id.clone()));
        }
        tombstone.insert(REV_KEY.into(), Value::String(new_rev));
        tombstone.insert(DELETED_KEY.into(), Value::Bool(true));
        self.update_cache(tombstone);
        Ok(())
    }

    /// Copies the server's current revision to `new_id`. The local document is untouched.
    pub async fn copy(&self, new_id: &str) -> ClientResult<CopyResponse> {
        let request = HttpRequest::new(Method::Copy, self.segments()).with_header("Destination", new_id);
        let response = self
            .database
            .remote()
            .send(request, &self.error_context(), COPY_RULES)
            .await?;

        let etag = response.etag();
        let body: WriteResponse = response.decode()?;
        let rev = body
            .rev
            .or_else(|| etag.clone())
            .ok_or_else(|| ClientError::protocol(format!("copy to '{}' returned no revision", new_id)))?;

        Ok(CopyResponse {
            id: body.id.unwrap_or_else(|| new_id.to_string()),
            rev,
            etag,
        })
    }

    /// Asks the server for the current revision without transferring the body.
    pub async fn info(&self) -> ClientResult<DocumentInfo> {
        let request = HttpRequest::new(Method::Head, self.segments());
        let response = self
            .database
            .remote()
            .send(request, &self.error_context(), INFO_RULES)
            .await?;
        let rev = response.etag().ok_or_else(|| {
            ClientError::protocol(format!("HEAD of '{}' returned no ETag", self.id))
        })?;

        Ok(DocumentInfo {
            id: self.id.clone(),
            rev,
        })
    }

    /// True if the document currently exists on the server.
    pub async fn exists_on_server(&self) -> ClientResult<bool> {
        let request = HttpRequest::new(Method::Head, self.segments());
        self.database
            .remote()
            .exists(request, &self.error_context(), INFO_RULES)
            .await
    }

    /// Unencoded path segments of the document endpoint.
    pub(crate) fn segments(&self) -> Vec<String> {
        let mut segments = vec![self.database.id().to_string()];
        match self.kind {
            DocumentKind::Security => segments.push(SECURITY_ID.to_string()),
            DocumentKind::Regular | DocumentKind::Design => {
                match ["_design/", "_local/"]
                    .iter()
                    .find(|prefix| self.id.starts_with(*prefix))
                {
                    Some(prefix) => {
                        segments.push(prefix.trim_end_matches('/').to_string());
                        segments.push(self.id[prefix.len()..].to_string());
                    }
                    None => segments.push(self.id.clone()),
                }
            }
        }
        segments
    }

    pub(crate) fn endpoint(&self) -> String {
        format!("/{}", self.segments().join("/"))
    }

    pub(crate) fn error_context(&self) -> ErrorContext {
        ErrorContext::new()
            .with("id", self.id.clone())
            .with("db", self.database.id())
            .with("endpoint", self.endpoint())
            .with("rev", self.rev().unwrap_or("<none>"))
    }

    /// Body as it is sent on a write.
    pub(crate) fn outgoing_body(&self) -> JsonObject {
        let mut body = self.data.clone();
        if self.synced_tombstone {
            body.remove(DELETED_KEY);
        }
        body
    }

    /// Records a successful write of [`outgoing_body`](Self::outgoing_body).
    pub(crate) fn apply_write(&mut self, rev: Option<&str>) {
        if self.synced_tombstone {
            self.data.remove(DELETED_KEY);
        }
        if let Some(rev) = rev {
            self.data.insert(REV_KEY.into(), Value::String(rev.to_string()));
        }
        self.refresh_fingerprint();
    }

    pub(crate) fn update_cache(&mut self, body: JsonObject) {
        self.data = body;
        self.refresh_fingerprint();
    }

    fn refresh_fingerprint(&mut self) {
        self.fingerprint = Some(Fingerprint::of(&self.data));
        self.synced_tombstone = self.data.get(DELETED_KEY) == Some(&Value::Bool(true));
    }

    fn ensure_clean(&self, action: &str, discard_changes: bool) -> ClientResult<()> {
        if self.is_dirty() && !(discard_changes || self.is_fresh()) {
            return Err(ClientError::Conflict(format!(
                "Cannot {} document '{}' from server, as the local cache has unsaved changes.",
                action, self.id
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("database", &self.database.id())
            .field("id", &self.id)
            .field("data", &self.data)
            .field("dirty", &self.is_dirty())
            .finish()
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = serde_json::to_string_pretty(&self.data).map_err(|_| fmt::Error)?;
        f.write_str(&rendered)
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use serde_json::json;

    #[tokio::test]
    async fn constructor_sets_id() {
        let (_, db) = testing::database("docs").await;
        let doc = Document::with_data(&db, "foo", json!({"foo": 42})).unwrap();

        assert_eq!(doc.id(), "foo");
        assert_eq!(doc.get("_id"), Some(&json!("foo")));
        assert_eq!(doc.get("foo"), Some(&json!(42)));
        assert!(doc.is_dirty());
        assert!(!doc.exists());
        assert!(doc.data().is_none());
    }

    #[tokio::test]
    async fn constructor_rejects_non_objects() {
        let (_, db) = testing::database("docs").await;
        let result = Document::with_data(&db, "foo", json!(42));
        assert!(matches!(result, Err(ClientError::InvalidType(_))));
    }

    #[tokio::test]
    async fn mapping_interface() {
        let (_, db) = testing::database("docs").await;
        let mut doc = Document::new(&db, "foo");

        assert_eq!(doc.keys().collect::<Vec<_>>(), vec!["_id"]);
        assert_eq!(doc.values().collect::<Vec<_>>(), vec![&json!("foo")]);

        doc.update([("test", json!("value"))]);
        assert!(doc.contains_key("test"));
        assert_eq!(doc.len(), 2);

        assert_eq!(doc.setdefault("baz", "bar"), &json!("bar"));
        assert_eq!(doc.setdefault("baz", "kitty"), &json!("bar"));
        assert_eq!(doc.remove("baz"), Some(json!("bar")));
        assert!(doc.get("baz").is_none());

        doc.clear();
        assert_eq!(doc.len(), 1);
        assert_eq!(doc.id(), "foo");
    }

    #[tokio::test]
    async fn dirty_tracking_follows_nested_edits() {
        let (_, db) = testing::database("docs").await;
        let mut doc = Document::new(&db, "foo");
        assert!(doc.is_dirty());

        doc.save().await.unwrap();
        assert!(!doc.is_dirty());

        doc.insert("foo", json!({"hello": "kitty"}));
        assert!(doc.is_dirty());
        doc.save().await.unwrap();
        assert!(!doc.is_dirty());

        if let Some(Value::Object(inner)) = doc.get_mut("foo") {
            inner.insert("llama".into(), json!("juicy"));
        }
        assert!(doc.is_dirty());
        doc.save().await.unwrap();
        assert!(!doc.is_dirty());
        assert!(doc.rev().unwrap().starts_with("3-"));
    }

    #[tokio::test]
    async fn fetch_guard_protects_edits() {
        let (_, db) = testing::filled_database().await;
        let mut doc = db.get("foo", None, None).await.unwrap();
        doc.insert("dirty", "edit");

        let err = doc.fetch(false, None).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(doc.get("dirty"), Some(&json!("edit")));

        doc.fetch(true, None).await.unwrap();
        assert!(doc.get("dirty").is_none());
        assert!(!doc.is_dirty());
    }

    #[tokio::test]
    async fn fresh_document_is_fetchable() {
        let (_, db) = testing::filled_database().await;
        let mut doc = Document::new(&db, "foo");
        assert!(doc.is_fresh());
        assert!(doc.is_dirty());

        doc.fetch(false, None).await.unwrap();
        assert_eq!(doc.get("bar"), Some(&json!(true)));
        assert!(doc.exists());
    }

    #[tokio::test]
    async fn save_is_idempotent() {
        let (server, db) = testing::database("docs").await;
        let mut doc = Document::new(&db, "foo");
        doc.insert("blub", "blubber");

        let first = doc.save().await.unwrap();
        assert!(first.is_some());
        let before = server.log().len();

        let second = doc.save().await.unwrap();
        assert!(second.is_none());
        assert_eq!(server.log().len(), before);
    }

    #[tokio::test]
    async fn stale_revision_conflicts() {
        let (_, db) = testing::filled_database().await;
        let mut first = db.get("foo", None, None).await.unwrap();
        let mut second = db.get("foo", None, None).await.unwrap();

        first.insert("blub", "new");
        first.save().await.unwrap();

        second.insert("blub", "bar");
        let err = second.save().await.unwrap_err();
        assert!(err.is_conflict());

        second.set_rev(first.rev().unwrap());
        second.save().await.unwrap();
        assert!(second.rev().unwrap().starts_with("3-"));
    }

    #[tokio::test]
    async fn delete_then_resurrect() {
        let (_, db) = testing::filled_database().await;
        let mut doc = db.get("foo", None, None).await.unwrap();
        assert!(doc.rev().unwrap().starts_with("1-"));

        doc.delete(false).await.unwrap();
        assert!(doc.rev().unwrap().starts_with("2-"));
        assert!(!doc.exists());
        assert!(doc.data().is_none());
        assert!(doc.contains_key("_deleted"));
        assert!(!doc.is_dirty());

        doc.insert("Zebras", "are majestic");
        doc.save().await.unwrap();
        assert!(doc.rev().unwrap().starts_with("3-"));
        assert!(doc.exists());
    }

    #[tokio::test]
    async fn delete_dirty_document_conflicts() {
        let (_, db) = testing::filled_database().await;
        let mut doc = db.get("foo", None, None).await.unwrap();
        doc.insert("fuzzy", "lizzy");

        assert!(doc.delete(false).await.unwrap_err().is_conflict());
        assert!(doc.rev().unwrap().starts_with("1-"));
    }

    #[tokio::test]
    async fn delete_without_revision_is_not_found() {
        let (_, db) = testing::database("docs").await;
        let mut doc = Document::new(&db, "nothing");
        assert!(doc.delete(false).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn fetch_historical_revision() {
        let (_, db) = testing::filled_database().await;
        let mut doc = db.get("foo", None, None).await.unwrap();
        let old_rev = doc.rev().unwrap().to_string();

        doc.insert("Zebras", "are the best");
        doc.save().await.unwrap();
        assert_ne!(doc.rev(), Some(old_rev.as_str()));

        doc.fetch(false, Some(&old_rev)).await.unwrap();
        assert_eq!(doc.rev(), Some(old_rev.as_str()));
        assert!(!doc.contains_key("Zebras"));
    }

    #[tokio::test]
    async fn info_tracks_revision() {
        let (_, db) = testing::database("docs").await;
        let mut doc = Document::new(&db, "foo42");
        doc.save().await.unwrap();

        let info = doc.info().await.unwrap();
        assert_eq!(info.id, "foo42");
        assert!(info.rev.starts_with("1-"));

        doc.delete(false).await.unwrap();
        assert!(doc.info().await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn copy_leaves_source_untouched() {
        let (_, db) = testing::filled_database().await;
        let foo = db.get("foo", None, None).await.unwrap();

        let response = foo.copy("foo_copy").await.unwrap();
        assert_eq!(response.id, "foo_copy");
        assert!(response.rev.starts_with("1-"));
        assert!(!foo.is_dirty());

        let copy = db.get("foo_copy", None, None).await.unwrap();
        assert_eq!(copy.json(), foo.json());
    }

    #[tokio::test]
    async fn json_hides_reserved_keys() {
        let (_, db) = testing::filled_database().await;
        let doc = db.get("foo", None, None).await.unwrap();

        let json = doc.json();
        assert_eq!(json.len(), 2);
        assert!(json.keys().all(|k| !k.starts_with('_')));
        assert_eq!(doc.data().map(|d| d.len()), Some(4));
    }

    #[tokio::test]
    async fn display_renders_body() {
        let (_, db) = testing::database("docs").await;
        let doc = Document::new(&db, "foo");
        let rendered = doc.to_string();
        assert!(rendered.contains("\"_id\": \"foo\""));
    }

    #[tokio::test]
    async fn special_ids_are_split_into_segments() {
        let (_, db) = testing::database("docs").await;
        assert_eq!(Document::new(&db, "plain").segments(), vec!["docs", "plain"]);
        assert_eq!(
            Document::new(&db, "_design/views").segments(),
            vec!["docs", "_design", "views"]
        );
        assert_eq!(
            Document::new(&db, "_local/checkpoint").segments(),
            vec!["docs", "_local", "checkpoint"]
        );
        assert_eq!(Document::new(&db, "a/b").segments(), vec!["docs", "a/b"]);
    }
}
