//! Mango `_find` request and response.

use crate::document::JsonObject;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of a `_find` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindRequest {
    /// Mango selector.
    pub selector: Value,
    /// Page size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    /// Continuation token from the previous page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bookmark: Option<String>,
    /// Any other `_find` option (`sort`, `use_index`, ...).
    #[serde(flatten)]
    pub extra: JsonObject,
}

impl FindRequest {
    /// Creates a request for the given selector.
    pub fn new(selector: Value) -> Self {
        Self {
            selector,
            limit: None,
            bookmark: None,
            extra: JsonObject::new(),
        }
    }
}

/// Response of a `_find` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindResponse {
    /// Matching documents.
    #[serde(default)]
    pub docs: Vec<JsonObject>,
    /// Continuation token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bookmark: Option<String>,
    /// Index warning.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extra_options_are_flattened() {
        let mut request = FindRequest::new(json!({"bar": true}));
        request.limit = Some(5);
        request.extra.insert("sort".into(), json!([{"bar2": "asc"}]));

        let encoded = serde_json::to_value(&request).unwrap();
        assert_eq!(
            encoded,
            json!({"selector": {"bar": true}, "limit": 5, "sort": [{"bar2": "asc"}]})
        );

        let decoded: FindRequest = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded.extra.get("sort"), Some(&json!([{"bar2": "asc"}])));
    }
}
