//! Document attachments.

use crate::document::Document;
use crate::error::{ClientError, ClientResult};
use crate::remote::{ErrorContext, ErrorRule};
use sofa_protocol::{HttpRequest, Method, Params};

const GET_RULES: &[ErrorRule] = &[
    ErrorRule::new(401, "Read privilege required for document '{document_id}'"),
    ErrorRule::new(403, "Read privilege required for document '{document_id}'"),
    ErrorRule::new(
        404,
        "The attachment '{id}' or the document '{document_id}' does not exist",
    ),
];

const PUT_RULES: &[ErrorRule] = &[
    ErrorRule::new(400, "Invalid request body or parameters"),
    ErrorRule::new(401, "Write privileges required for document '{document_id}'"),
    ErrorRule::new(403, "Write privileges required for document '{document_id}'"),
    ErrorRule::new(404, "Specified database, document or attachment was not found"),
    ErrorRule::new(
        409,
        "Revision '{document_rev}' of document '{document_id}' is not the latest",
    ),
];

const DELETE_RULES: &[ErrorRule] = &[
    ErrorRule::new(400, "Invalid request body or parameters"),
    ErrorRule::new(401, "Write privileges required for document '{document_id}'"),
    ErrorRule::new(403, "Write privileges required for document '{document_id}'"),
    ErrorRule::new(404, "Specified database, document or attachment was not found"),
    ErrorRule::new(
        409,
        "Revision '{document_rev}' of document '{document_id}' is not the latest",
    ),
];

/// Handle to one attachment of a [`Document`].
///
/// Writes go against the document's current revision and refetch the
/// document afterwards, so its `_rev` and `_attachments` stay current.
#[derive(Debug)]
pub struct Attachment<'a> {
    document: &'a mut Document,
    name: String,
    content_type: Option<String>,
}

impl<'a> Attachment<'a> {
    pub(crate) fn new(document: &'a mut Document, name: impl Into<String>) -> Self {
        Self {
            document,
            name: name.into(),
            content_type: None,
        }
    }

    /// Returns the attachment name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Content type reported by the last [`fetch`](Attachment::fetch).
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Returns the owning document.
    pub fn document(&self) -> &Document {
        &*self.document
    }

    /// True if the attachment exists on the server.
    pub async fn exists(&self) -> ClientResult<bool> {
        let request = HttpRequest::new(Method::Head, self.segments());
        self.document
            .database()
            .remote()
            .exists(request, &self.error_context(), GET_RULES)
            .await
    }

    /// Downloads the attachment content.
    pub async fn fetch(&mut self) -> ClientResult<Vec<u8>> {
        let request = HttpRequest::new(Method::Get, self.segments());
        let response = self
            .document
            .database()
            .remote()
            .send(request, &self.error_context(), GET_RULES)
            .await?;

        self.content_type = response.header("Content-Type").map(str::to_string);
        Ok(response.body)
    }

    /// Uploads new content and refreshes the owning document.
    pub async fn save(&mut self, data: Vec<u8>, content_type: &str) -> ClientResult<()> {
        let rev = self.document_rev()?;
        let request = HttpRequest::new(Method::Put, self.segments())
            .with_params(Params::new().with("rev", rev))
            .with_bytes(data, content_type);
        self.document
            .database()
            .remote()
            .send(request, &self.error_context(), PUT_RULES)
            .await?;

        self.content_type = Some(content_type.to_string());
        self.document.fetch(false, None).await
    }

    /// Removes the attachment and refreshes the owning document.
    pub async fn delete(&mut self) -> ClientResult<()> {
        let rev = self.document_rev()?;
        let request = HttpRequest::new(Method::Delete, self.segments())
            .with_params(Params::new().with("rev", rev));
        self.document
            .database()
            .remote()
            .send(request, &self.error_context(), DELETE_RULES)
            .await?;

        self.content_type = None;
        self.document.fetch(false, None).await
    }

    fn document_rev(&self) -> ClientResult<String> {
        if !self.document.exists() {
            return Err(ClientError::invalid_operation(
                "The document must be fetched or saved before updating attachments",
            ));
        }
        self.document
            .rev()
            .map(str::to_string)
            .ok_or_else(|| ClientError::invalid_operation("document has no revision"))
    }

    fn segments(&self) -> Vec<String> {
        let mut segments = self.document.segments();
        segments.push(self.name.clone());
        segments
    }

    fn error_context(&self) -> ErrorContext {
        ErrorContext::new()
            .with("id", self.name.clone())
            .with("document_id", self.document.id())
            .with("document_rev", self.document.rev().unwrap_or("<none>"))
            .with("db", self.document.database().id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    const TEXT: &[u8] = b"Lorem ipsum dolor sit amet, consectetur adipiscing elit.";
    const IMAGE: &[u8] = b"RIFF\xb0\x00\x00\x00WEBPVP8 \xa4\x00\x00\x00P\x06\x00\x9d\x01*K\x002\x00";

    #[tokio::test]
    async fn save_and_fetch() {
        let (_, db) = testing::database("attachments").await;
        let mut doc = Document::new(&db, "foo");
        doc.save().await.unwrap();

        doc.attachment("image.webp")
            .save(IMAGE.to_vec(), "image/webp")
            .await
            .unwrap();
        assert!(doc.rev().unwrap().starts_with("2-"));
        assert!(doc.contains_key("_attachments"));

        let mut unfetched = Document::new(&db, "foo");
        let mut att = unfetched.attachment("image.webp");
        assert!(att.exists().await.unwrap());
        assert_eq!(att.fetch().await.unwrap(), IMAGE.to_vec());
        assert_eq!(att.content_type(), Some("image/webp"));
    }

    #[tokio::test]
    async fn save_requires_existing_document() {
        let (_, db) = testing::database("attachments").await;
        let mut doc = Document::new(&db, "foo");
        doc.save().await.unwrap();

        let mut unfetched = Document::new(&db, "foo");
        let err = unfetched
            .attachment("lipsum.txt")
            .save(TEXT.to_vec(), "text/plain")
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidOperation(_)));
    }

    #[tokio::test]
    async fn attachments_survive_document_updates() {
        let (_, db) = testing::database("attachments").await;
        let mut doc = Document::new(&db, "foo");
        doc.insert("value", 42);
        doc.save().await.unwrap();

        doc.attachment("lipsum.txt")
            .save(TEXT.to_vec(), "text/plain")
            .await
            .unwrap();
        doc.insert("value", 43);
        doc.save().await.unwrap();

        let mut reloaded = db.get("foo", None, None).await.unwrap();
        assert_eq!(reloaded.get("value"), Some(&serde_json::json!(43)));
        assert_eq!(
            reloaded.attachment("lipsum.txt").fetch().await.unwrap(),
            TEXT.to_vec()
        );
    }

    #[tokio::test]
    async fn outdated_document_conflicts() {
        let (_, db) = testing::database("attachments").await;
        let mut doc = Document::new(&db, "foo");
        doc.save().await.unwrap();
        let mut outdated = db.get("foo", None, None).await.unwrap();

        doc.insert("value", 42);
        doc.save().await.unwrap();

        let err = outdated
            .attachment("image.webp")
            .save(IMAGE.to_vec(), "image/webp")
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn delete_removes_attachment() {
        let (_, db) = testing::database("attachments").await;
        let mut doc = Document::new(&db, "foo");
        doc.save().await.unwrap();
        doc.attachment("lipsum.txt")
            .save(TEXT.to_vec(), "text/plain")
            .await
            .unwrap();

        let mut att = doc.attachment("lipsum.txt");
        att.delete().await.unwrap();
        assert!(!att.exists().await.unwrap());
        assert!(doc.rev().unwrap().starts_with("3-"));
    }
}
