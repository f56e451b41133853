//! View and `_all_docs` responses.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single row of a view response.
///
/// Rows for keys that do not exist carry only `key` and `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewRow {
    /// Document id the row was emitted from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Emitted key.
    #[serde(default)]
    pub key: Value,
    /// Emitted value.
    #[serde(default)]
    pub value: Value,
    /// Document body when `include_docs` was requested; `null` for tombstones.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<Value>,
    /// Row level error (`not_found`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ViewRow {
    /// Returns true if the row carries an error.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Response of a view or `_all_docs` query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewResponse {
    /// Offset of the first row.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    /// Rows in index order.
    #[serde(default)]
    pub rows: Vec<ViewRow>,
    /// Total rows in the index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_rows: Option<u64>,
    /// Update sequence, when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_seq: Option<Value>,
}

/// Body of a view `POST` restricted to keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeysRequest {
    /// Requested keys.
    pub keys: Vec<Value>,
}
