//! Query parameters of views and `_all_docs`.

use crate::collate::collate;
use crate::error::{ServerError, ServerResult};
use serde_json::Value;
use sofa_protocol::{HttpRequest, ViewRow};
use std::cmp::Ordering;

/// Parsed range and paging options.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewQuery {
    /// Exact key.
    pub key: Option<Value>,
    /// First key of the range, in iteration order.
    pub start_key: Option<Value>,
    /// Last key of the range, in iteration order.
    pub end_key: Option<Value>,
    /// Whether `end_key` itself is included.
    pub inclusive_end: bool,
    /// Iterate in reverse order.
    pub descending: bool,
    /// Rows to skip.
    pub skip: usize,
    /// Maximum rows to return.
    pub limit: Option<usize>,
    /// Embed document bodies.
    pub include_docs: bool,
    /// Run the reducer if the view has one.
    pub reduce: Option<bool>,
    /// Group reduced rows by key.
    pub group: bool,
    /// Include the update sequence.
    pub update_seq: bool,
}

impl Default for ViewQuery {
    fn default() -> Self {
        Self {
            key: None,
            start_key: None,
            end_key: None,
            inclusive_end: true,
            descending: false,
            skip: 0,
            limit: None,
            include_docs: false,
            reduce: None,
            group: false,
            update_seq: false,
        }
    }
}

impl ViewQuery {
    /// Reads the query string of `request`.
    pub fn from_request(request: &HttpRequest) -> ServerResult<Self> {
        let mut query = Self::default();
        for (name, raw) in &request.query {
            match name.as_str() {
                "key" => query.key = Some(json_param(name, raw)?),
                "startkey" | "start_key" => query.start_key = Some(json_param(name, raw)?),
                "endkey" | "end_key" => query.end_key = Some(json_param(name, raw)?),
                "inclusive_end" => query.inclusive_end = bool_param(name, raw)?,
                "descending" => query.descending = bool_param(name, raw)?,
                "skip" => query.skip = int_param(name, raw)?,
                "limit" => query.limit = Some(int_param(name, raw)?),
                "include_docs" => query.include_docs = bool_param(name, raw)?,
                "reduce" => query.reduce = Some(bool_param(name, raw)?),
                "group" => query.group = bool_param(name, raw)?,
                "update_seq" => query.update_seq = bool_param(name, raw)?,
                _ => {}
            }
        }
        Ok(query)
    }

    /// True if a row with `key` lies inside the requested range.
    pub fn in_range(&self, key: &Value) -> bool {
        if let Some(exact) = &self.key {
            return collate(key, exact) == Ordering::Equal;
        }

        // Bounds are given in iteration order; flip them for descending scans.
        let (lower, upper, lower_inclusive, upper_inclusive) = if self.descending {
            (&self.end_key, &self.start_key, self.inclusive_end, true)
        } else {
            (&self.start_key, &self.end_key, true, self.inclusive_end)
        };

        let above_lower = lower.as_ref().map_or(true, |bound| match collate(key, bound) {
            Ordering::Greater => true,
            Ordering::Equal => lower_inclusive,
            Ordering::Less => false,
        });
        let below_upper = upper.as_ref().map_or(true, |bound| match collate(key, bound) {
            Ordering::Less => true,
            Ordering::Equal => upper_inclusive,
            Ordering::Greater => false,
        });
        above_lower && below_upper
    }

    /// Applies range, order, skip and limit to rows sorted ascending.
    ///
    /// Returns the offset of the first returned row and the rows.
    pub fn select(&self, mut rows: Vec<ViewRow>) -> (u64, Vec<ViewRow>) {
        if self.descending {
            rows.reverse();
        }

        let first_in_range = rows.iter().position(|row| self.in_range(&row.key));
        let offset = first_in_range.unwrap_or(rows.len()) + self.skip;

        let selected = rows
            .into_iter()
            .filter(|row| self.in_range(&row.key))
            .skip(self.skip)
            .take(self.limit.unwrap_or(usize::MAX))
            .collect();
        (offset as u64, selected)
    }
}

fn json_param(name: &str, raw: &str) -> ServerResult<Value> {
    serde_json::from_str(raw)
        .map_err(|_| ServerError::BadRequest(format!("Invalid JSON value for '{}': {}", name, raw)))
}

fn bool_param(name: &str, raw: &str) -> ServerResult<bool> {
    match raw {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(ServerError::BadRequest(format!(
            "Invalid boolean parameter '{}': {}",
            name, raw
        ))),
    }
}

fn int_param(name: &str, raw: &str) -> ServerResult<usize> {
    raw.parse().map_err(|_| {
        ServerError::BadRequest(format!("Invalid value for integer parameter '{}': {}", name, raw))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sofa_protocol::{Method, Params};

    fn rows(keys: &[&str]) -> Vec<ViewRow> {
        keys.iter()
            .map(|k| ViewRow {
                id: Some(k.to_string()),
                key: json!(k),
                value: Value::Null,
                doc: None,
                error: None,
            })
            .collect()
    }

    fn ids(rows: &[ViewRow]) -> Vec<&str> {
        rows.iter().filter_map(|r| r.id.as_deref()).collect()
    }

    fn query(params: Params) -> ViewQuery {
        let request = HttpRequest::new(Method::Get, ["db", "_all_docs"]).with_params(params);
        ViewQuery::from_request(&request).unwrap()
    }

    #[test]
    fn parses_parameters() {
        let q = query(
            Params::new()
                .with("startkey", "a")
                .with("limit", 2)
                .with("include_docs", true)
                .with("descending", false),
        );
        assert_eq!(q.start_key, Some(json!("a")));
        assert_eq!(q.limit, Some(2));
        assert!(q.include_docs);
        assert!(q.inclusive_end);
    }

    #[test]
    fn rejects_malformed_values() {
        let request = HttpRequest::new(Method::Get, ["db", "_all_docs"])
            .with_params(Params::new().with("limit", "many"));
        assert_eq!(ViewQuery::from_request(&request).unwrap_err().status(), 400);
    }

    #[test]
    fn range_and_paging() {
        let all = rows(&["baz", "baz2", "foo", "foo2"]);

        let q = query(Params::new().with("startkey", "foo").with("endkey", "foo\u{10FFFE}"));
        assert_eq!(ids(&q.select(all.clone()).1), vec!["foo", "foo2"]);

        let q = query(Params::new().with("skip", 1).with("limit", 2));
        let (offset, selected) = q.select(all.clone());
        assert_eq!(offset, 1);
        assert_eq!(ids(&selected), vec!["baz2", "foo"]);

        let q = query(Params::new().with("descending", true).with("startkey", "foo"));
        assert_eq!(ids(&q.select(all.clone()).1), vec!["foo", "baz2", "baz"]);

        let q = query(Params::new().with("endkey", "foo").with("inclusive_end", false));
        assert_eq!(ids(&q.select(all).1), vec!["baz", "baz2"]);
    }
}
