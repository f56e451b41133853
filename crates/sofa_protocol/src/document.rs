//! Document bodies, reserved keys and write results.

use serde::{Deserialize, Serialize};

/// A JSON object, the shape of every document body.
pub type JsonObject = serde_json::Map<String, serde_json::Value>;

/// Key holding the document id.
pub const ID_KEY: &str = "_id";
/// Key holding the revision token.
pub const REV_KEY: &str = "_rev";
/// Key marking a tombstone.
pub const DELETED_KEY: &str = "_deleted";
/// Key holding attachment stubs.
pub const ATTACHMENTS_KEY: &str = "_attachments";

/// Returns true for keys owned by the protocol rather than the user.
pub fn is_reserved(key: &str) -> bool {
    key.starts_with('_')
}

/// Response to a single-document write (`PUT`, `DELETE`, `COPY`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteResponse {
    /// Set on success.
    #[serde(default)]
    pub ok: bool,
    /// Id of the written document. The security endpoint omits it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// New revision. The security endpoint omits it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
}

impl WriteResponse {
    /// Creates a successful write response.
    pub fn new(id: impl Into<String>, rev: impl Into<String>) -> Self {
        Self {
            ok: true,
            id: Some(id.into()),
            rev: Some(rev.into()),
        }
    }
}

/// Body of a `_bulk_docs` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkDocsRequest {
    /// Full document bodies, in request order.
    pub docs: Vec<JsonObject>,
    /// `false` for replication-style writes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_edits: Option<bool>,
}

impl BulkDocsRequest {
    /// Creates a request for the given bodies.
    pub fn new(docs: Vec<JsonObject>) -> Self {
        Self {
            docs,
            new_edits: None,
        }
    }
}

/// Per-document status row of a `_bulk_docs` response.
///
/// Either `{id, ok: true, rev}` or `{id, error, reason}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkDocStatus {
    /// Document id.
    pub id: String,
    /// Present on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
    /// New revision on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    /// Error kind on failure (`conflict`, `forbidden`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Human readable failure reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl BulkDocStatus {
    /// Creates a success row.
    pub fn success(id: impl Into<String>, rev: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ok: Some(true),
            rev: Some(rev.into()),
            error: None,
            reason: None,
        }
    }

    /// Creates a failure row.
    pub fn failure(
        id: impl Into<String>,
        error: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            ok: None,
            rev: None,
            error: Some(error.into()),
            reason: Some(reason.into()),
        }
    }

    /// Returns true if the row carries the `ok` marker.
    pub fn is_ok(&self) -> bool {
        self.ok.is_some()
    }
}

/// JSON error body returned with non-2xx responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Short error kind.
    pub error: String,
    /// Human readable reason.
    pub reason: String,
}

impl ErrorBody {
    /// Creates an error body.
    pub fn new(error: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            reason: reason.into(),
        }
    }
}
