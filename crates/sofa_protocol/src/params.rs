//! Query parameter encoding.

use serde_json::Value;

/// Parameters whose values the server parses as JSON.
const JSON_PARAMS: &[&str] = &[
    "key",
    "keys",
    "startkey",
    "start_key",
    "endkey",
    "end_key",
];

/// An ordered set of query parameters.
///
/// Values are stored as JSON and stringified the way the server expects:
/// `null` is dropped, booleans become `true`/`false`, strings are passed
/// through, and key-like parameters are JSON-encoded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    entries: Vec<(String, Value)>,
}

impl Params {
    /// Creates an empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a parameter, replacing a previous value of the same name.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Builder form of [`Params::set`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Returns a parameter value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Returns true if the parameter is present.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Removes a parameter.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let index = self.entries.iter().position(|(k, _)| k == name)?;
        Some(self.entries.remove(index).1)
    }

    /// Merges another set into this one; `other` wins on collisions.
    pub fn extend(&mut self, other: Params) {
        for (name, value) in other.entries {
            self.set(name, value);
        }
    }

    /// Returns true if no parameters are set.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over the raw entries.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Stringifies the parameters for the query string.
    pub fn into_pairs(self) -> Vec<(String, String)> {
        self.entries
            .into_iter()
            .filter_map(|(name, value)| {
                let rendered = stringify(&name, value)?;
                Some((name, rendered))
            })
            .collect()
    }
}

fn stringify(name: &str, value: Value) -> Option<String> {
    if JSON_PARAMS.contains(&name) {
        return match value {
            Value::Null => None,
            other => Some(other.to_string()),
        };
    }

    match value {
        Value::Null => None,
        Value::Bool(true) => Some("true".into()),
        Value::Bool(false) => Some("false".into()),
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stringifies_values() {
        let pairs = Params::new()
            .with("include_docs", true)
            .with("descending", false)
            .with("limit", 10)
            .with("since", "now")
            .with("skip", Value::Null)
            .into_pairs();

        assert_eq!(
            pairs,
            vec![
                ("include_docs".to_string(), "true".to_string()),
                ("descending".to_string(), "false".to_string()),
                ("limit".to_string(), "10".to_string()),
                ("since".to_string(), "now".to_string()),
            ]
        );
    }

    #[test]
    fn json_encodes_keys() {
        let pairs = Params::new()
            .with("startkey", "foo")
            .with("keys", json!(["a", "b"]))
            .into_pairs();

        assert_eq!(pairs[0].1, "\"foo\"");
        assert_eq!(pairs[1].1, "[\"a\",\"b\"]");
    }

    #[test]
    fn set_replaces_and_extend_overrides() {
        let mut params = Params::new().with("limit", 1);
        params.set("limit", 2);
        params.extend(Params::new().with("limit", 3).with("skip", 4));

        assert_eq!(params.get("limit"), Some(&json!(3)));
        assert_eq!(params.iter().count(), 2);
        assert_eq!(params.remove("skip"), Some(json!(4)));
        assert!(!params.contains("skip"));
    }
}
