//! `_changes` feed rows.

use crate::document::JsonObject;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A revision entry of a change row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRev {
    /// Revision produced by the change.
    pub rev: String,
}

/// A single row of the changes feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRow {
    /// Opaque update sequence.
    pub seq: Value,
    /// Changed document.
    pub id: String,
    /// Leaf revisions; the first entry is the winning one.
    #[serde(default)]
    pub changes: Vec<ChangeRev>,
    /// Set when the change is a deletion.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deleted: bool,
    /// Body when `include_docs` was requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<JsonObject>,
}

/// Response of a normal or long-poll changes request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangesResponse {
    /// Change rows in sequence order.
    #[serde(default)]
    pub results: Vec<ChangeRow>,
    /// Sequence to resume from.
    #[serde(default)]
    pub last_seq: Value,
    /// Number of changes not yet delivered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_rows() {
        let response: ChangesResponse = serde_json::from_value(json!({
            "results": [
                {"seq": "1-x", "id": "foo", "changes": [{"rev": "1-a"}]},
                {"seq": "2-x", "id": "bar", "changes": [{"rev": "2-b"}], "deleted": true}
            ],
            "last_seq": "2-x",
            "pending": 0
        }))
        .unwrap();

        assert_eq!(response.results.len(), 2);
        assert!(!response.results[0].deleted);
        assert!(response.results[1].deleted);
        assert_eq!(response.results[1].changes[0].rev, "2-b");
        assert_eq!(response.last_seq, json!("2-x"));
    }
}
