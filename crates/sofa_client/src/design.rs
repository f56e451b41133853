//! Design documents.

use crate::database::Database;
use crate::document::{json_type_name, Document, DocumentKind};
use crate::error::{ClientError, ClientResult};
use crate::view::View;
use serde_json::Value;
use sofa_protocol::{JsonObject, WriteResponse};
use std::ops::Deref;

/// Id prefix of design documents.
pub const DESIGN_PREFIX: &str = "_design/";

/// Top-level keys a design document may carry.
pub const ALLOWED_KEYS: &[&str] = &[
    "language",
    "options",
    "filters",
    "lists",
    "rewrites",
    "shows",
    "updates",
    "validate_doc_update",
    "views",
];

const VIEWS: &str = "views";

/// A design document: `/{db}/_design/{name}`.
///
/// Dereferences to the underlying [`Document`] for reading. Writes go
/// through [`set`](DesignDocument::set), which only accepts
/// [`ALLOWED_KEYS`].
#[derive(Debug, Clone)]
pub struct DesignDocument {
    document: Document,
    name: String,
}

impl DesignDocument {
    /// Creates a local design document. `name` may carry the `_design/` prefix.
    pub fn new(database: &Database, name: impl Into<String>) -> Self {
        let name: String = name.into();
        let name = name.trim_start_matches(DESIGN_PREFIX).to_string();
        Self {
            document: Document::with_kind(
                database,
                format!("{}{}", DESIGN_PREFIX, name),
                DocumentKind::Design,
                JsonObject::new(),
            ),
            name,
        }
    }

    /// Returns the name without the `_design/` prefix.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sets a top-level key.
    ///
    /// Fails with [`ClientError::InvalidArgument`] for keys outside [`ALLOWED_KEYS`].
    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> ClientResult<Option<Value>> {
        if !ALLOWED_KEYS.contains(&key) {
            return Err(ClientError::invalid_argument(format!(
                "The key '{}' is not allowed in an design document.",
                key
            )));
        }
        Ok(self.document.insert(key, value))
    }

    /// Removes a top-level key.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.document.remove(key)
    }

    /// See [`Document::fetch`].
    pub async fn fetch(&mut self, discard_changes: bool) -> ClientResult<()> {
        self.document.fetch(discard_changes, None).await
    }

    /// See [`Document::save`].
    pub async fn save(&mut self) -> ClientResult<Option<WriteResponse>> {
        self.document.save().await
    }

    /// See [`Document::delete`].
    pub async fn delete(&mut self, discard_changes: bool) -> ClientResult<()> {
        self.document.delete(discard_changes).await
    }

    /// Returns a handle to a view of this design document. No I/O.
    pub fn view(&self, view: impl Into<String>) -> View {
        View::design(self.document.database(), self.name.clone(), view)
    }

    /// Adds a JavaScript view and saves the design document.
    ///
    /// Fails with [`ClientError::Conflict`] if the view already exists and
    /// `exists_ok` is not set.
    pub async fn create_view(
        &mut self,
        view: &str,
        map_function: &str,
        reduce_function: Option<&str>,
        exists_ok: bool,
    ) -> ClientResult<View> {
        let views = match self
            .document
            .setdefault(VIEWS, Value::Object(JsonObject::new()))
        {
            Value::Object(views) => views,
            other => {
                return Err(ClientError::InvalidType(format!(
                    "'views' of design document '{}' is {}, expected an object",
                    self.name,
                    json_type_name(other)
                )))
            }
        };

        if views.contains_key(view) && !exists_ok {
            return Err(ClientError::Conflict(format!(
                "The view '{}' does already exist in the design document {}",
                view, self.name
            )));
        }

        let mut definition = JsonObject::new();
        definition.insert("map".into(), Value::String(map_function.to_string()));
        if let Some(reduce) = reduce_function {
            definition.insert("reduce".into(), Value::String(reduce.to_string()));
        }
        views.insert(view.to_string(), Value::Object(definition));
        self.document.insert("language", "javascript");

        self.save().await?;
        Ok(self.view(view))
    }

    /// Unwraps the underlying document.
    pub fn into_document(self) -> Document {
        self.document
    }
}

impl Deref for DesignDocument {
    type Target = Document;

    fn deref(&self) -> &Document {
        &self.document
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use serde_json::json;
    use sofa_protocol::Params;

    #[tokio::test]
    async fn id_carries_prefix() {
        let (_, db) = testing::database("designs").await;
        let ddoc = DesignDocument::new(&db, "test_ddoc");
        assert_eq!(ddoc.name(), "test_ddoc");
        assert_eq!(ddoc.id(), "_design/test_ddoc");
        assert_eq!(ddoc.segments(), vec!["designs", "_design", "test_ddoc"]);

        let prefixed = DesignDocument::new(&db, "_design/test_ddoc");
        assert_eq!(prefixed.name(), "test_ddoc");
    }

    #[tokio::test]
    async fn only_allowed_keys() {
        let (_, db) = testing::database("designs").await;
        let mut ddoc = DesignDocument::new(&db, "test_ddoc");

        ddoc.set("language", "javascript").unwrap();
        let err = ddoc.set("kitty", "hello").unwrap_err();
        assert!(matches!(err, ClientError::InvalidArgument(_)));
        assert!(!ddoc.contains_key("kitty"));
    }

    #[tokio::test]
    async fn create_view_saves() {
        let (_, db) = testing::filled_database().await;
        let mut ddoc = db.design_doc("test_ddoc", false).await.unwrap();

        let view = ddoc
            .create_view("null_view", "function (doc) { emit(doc._id, null); }", None, false)
            .await
            .unwrap();
        assert!(ddoc.exists());
        assert!(!ddoc.is_dirty());
        assert_eq!(ddoc.get("language"), Some(&json!("javascript")));
        assert_eq!(view.design_doc(), Some("test_ddoc"));

        let values = view.values(Params::new()).await.unwrap();
        assert_eq!(values, vec![Value::Null; 4]);

        let err = ddoc
            .create_view("null_view", "function (doc) { emit(doc._id, 1); }", None, false)
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        ddoc.create_view("null_view", "function (doc) { emit(doc._id, 1); }", None, true)
            .await
            .unwrap();
        assert!(ddoc.rev().unwrap().starts_with("2-"));
    }

    #[tokio::test]
    async fn existing_design_doc_conflicts() {
        let (_, db) = testing::database("designs").await;
        let mut ddoc = db.design_doc("test_ddoc", false).await.unwrap();
        ddoc.save().await.unwrap();

        assert!(db.design_doc("test_ddoc", false).await.unwrap_err().is_conflict());
        let existing = db.design_doc("test_ddoc", true).await.unwrap();
        assert!(existing.exists());
    }
}
