//! A tiny interpreter for JavaScript map functions.
//!
//! Only the shape tests actually use is understood:
//!
//! ```text
//! function (doc) { [if (EXPR)] emit(EXPR, EXPR); }
//! ```
//!
//! where `EXPR` is `null`, `true`, `false`, a number, a quoted string,
//! `doc`, a dotted path such as `doc.address.city`, or an array of
//! expressions. Built-in reducers `_count` and `_sum` are supported.
//! Anything else is rejected with [`ServerError::NotImplemented`].

use crate::error::{ServerError, ServerResult};
use serde_json::{Number, Value};
use sofa_protocol::JsonObject;

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    Doc,
    Path(Vec<String>),
    Array(Vec<Expr>),
}

impl Expr {
    fn parse(text: &str) -> ServerResult<Self> {
        let text = text.trim();
        match text {
            "null" | "undefined" => return Ok(Expr::Literal(Value::Null)),
            "true" => return Ok(Expr::Literal(Value::Bool(true))),
            "false" => return Ok(Expr::Literal(Value::Bool(false))),
            "doc" => return Ok(Expr::Doc),
            _ => {}
        }

        if let Some(path) = text.strip_prefix("doc.") {
            let segments: Vec<String> = path.split('.').map(str::to_string).collect();
            if segments.iter().all(|s| is_identifier(s)) {
                return Ok(Expr::Path(segments));
            }
        }
        if let Some(inner) = text.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
            let items = split_top_level(inner)?;
            return items
                .iter()
                .filter(|item| !item.trim().is_empty())
                .map(|item| Expr::parse(item))
                .collect::<ServerResult<Vec<_>>>()
                .map(Expr::Array);
        }
        if let Some(literal) = quoted(text) {
            return Ok(Expr::Literal(Value::String(literal)));
        }
        if let Ok(int) = text.parse::<i64>() {
            return Ok(Expr::Literal(Value::from(int)));
        }
        if let Some(number) = text.parse::<f64>().ok().and_then(Number::from_f64) {
            return Ok(Expr::Literal(Value::Number(number)));
        }

        Err(unsupported(text))
    }

    fn eval(&self, doc: &JsonObject) -> Value {
        match self {
            Expr::Literal(value) => value.clone(),
            Expr::Doc => Value::Object(doc.clone()),
            Expr::Path(segments) => {
                let mut current = doc.get(&segments[0]);
                for segment in &segments[1..] {
                    current = current.and_then(|v| v.get(segment));
                }
                current.cloned().unwrap_or(Value::Null)
            }
            Expr::Array(items) => Value::Array(items.iter().map(|e| e.eval(doc)).collect()),
        }
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

fn quoted(text: &str) -> Option<String> {
    ['"', '\'']
        .iter()
        .find_map(|q| text.strip_prefix(*q).and_then(|t| t.strip_suffix(*q)))
        .map(str::to_string)
}

fn unsupported(text: &str) -> ServerError {
    ServerError::NotImplemented(format!(
        "map function expression '{}' is not supported by the in-memory server",
        text
    ))
}

/// Splits on commas that are not nested in brackets or quotes.
fn split_top_level(text: &str) -> ServerResult<Vec<&str>> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (index, c) in text.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '(' | '[' | '{') => depth += 1,
            (None, ')' | ']' | '}') => depth -= 1,
            (None, ',') if depth == 0 => {
                parts.push(&text[start..index]);
                start = index + 1;
            }
            _ => {}
        }
        if depth < 0 {
            return Err(unsupported(text));
        }
    }
    parts.push(&text[start..]);
    Ok(parts)
}

/// Returns the text between the parenthesis at `open` and its partner.
fn parenthesized(text: &str, open: usize) -> ServerResult<(&str, usize)> {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;

    for (offset, c) in text[open..].char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => {
                depth -= 1;
                if depth == 0 {
                    let close = open + offset;
                    return Ok((&text[open + 1..close], close));
                }
            }
            _ => {}
        }
    }
    Err(unsupported(text))
}

/// Built-in reducers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reducer {
    /// Number of rows.
    Count,
    /// Sum of numeric values.
    Sum,
}

impl Reducer {
    fn parse(text: &str) -> ServerResult<Self> {
        match text.trim() {
            "_count" => Ok(Reducer::Count),
            "_sum" => Ok(Reducer::Sum),
            other => Err(ServerError::NotImplemented(format!(
                "reduce function '{}' is not supported by the in-memory server",
                other
            ))),
        }
    }

    /// Reduces the values of a group.
    pub fn reduce<'a>(&self, values: impl Iterator<Item = &'a Value>) -> Value {
        match self {
            Reducer::Count => Value::from(values.count() as u64),
            Reducer::Sum => {
                let mut integral = 0i64;
                let mut fractional = 0f64;
                let mut is_float = false;
                for value in values {
                    if let Some(i) = value.as_i64() {
                        integral += i;
                    } else if let Some(f) = value.as_f64() {
                        fractional += f;
                        is_float = true;
                    }
                }
                if is_float {
                    Number::from_f64(integral as f64 + fractional)
                        .map(Value::Number)
                        .unwrap_or(Value::Null)
                } else {
                    Value::from(integral)
                }
            }
        }
    }
}

/// A parsed view of a design document.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewDefinition {
    condition: Option<Expr>,
    key: Expr,
    value: Expr,
    reducer: Option<Reducer>,
}

impl ViewDefinition {
    /// Parses `{"map": "...", "reduce": "..."}`.
    pub fn parse(definition: &Value) -> ServerResult<Self> {
        let map = definition
            .get("map")
            .and_then(Value::as_str)
            .ok_or_else(|| ServerError::BadRequest("view has no map function".into()))?;
        let reducer = definition
            .get("reduce")
            .and_then(Value::as_str)
            .map(Reducer::parse)
            .transpose()?;

        let emit_at = map.find("emit(").ok_or_else(|| unsupported(map))?;
        let (args, _) = parenthesized(map, emit_at + "emit".len())?;
        let args = split_top_level(args)?;
        let (key, value) = match args.as_slice() {
            [key, value] => (Expr::parse(key)?, Expr::parse(value)?),
            _ => return Err(unsupported(map)),
        };

        let condition = match map[..emit_at].find("if") {
            Some(if_at) => {
                let open = map[if_at..emit_at]
                    .find('(')
                    .map(|offset| if_at + offset)
                    .ok_or_else(|| unsupported(map))?;
                let (condition, _) = parenthesized(map, open)?;
                Some(Expr::parse(condition)?)
            }
            None => None,
        };

        Ok(Self {
            condition,
            key,
            value,
            reducer,
        })
    }

    /// The row a document emits, if any.
    pub fn emit(&self, doc: &JsonObject) -> Option<(Value, Value)> {
        if let Some(condition) = &self.condition {
            if !truthy(&condition.eval(doc)) {
                return None;
            }
        }
        Some((self.key.eval(doc), self.value.eval(doc)))
    }

    /// The reducer, if the view has one.
    pub fn reducer(&self) -> Option<Reducer> {
        self.reducer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> JsonObject {
        match value {
            Value::Object(map) => map,
            _ => JsonObject::new(),
        }
    }

    fn view(map: &str) -> ViewDefinition {
        ViewDefinition::parse(&json!({ "map": map })).unwrap()
    }

    #[test]
    fn emits_paths_and_literals() {
        let foo = doc(json!({"_id": "foo", "bar": true, "nested": {"x": 3}}));

        let v = view("function (doc) { emit(doc._id, null); }");
        assert_eq!(v.emit(&foo), Some((json!("foo"), Value::Null)));

        let v = view("function(doc) { emit(doc._id, doc.bar); }");
        assert_eq!(v.emit(&foo), Some((json!("foo"), json!(true))));

        let v = view("function(doc) { emit([doc.nested.x, 'a'], 1); }");
        assert_eq!(v.emit(&foo), Some((json!([3, "a"]), json!(1))));

        let v = view("function(doc) { emit(doc.missing, doc); }");
        assert_eq!(v.emit(&foo).map(|(k, _)| k), Some(Value::Null));
    }

    #[test]
    fn condition_filters_documents() {
        let v = view("function (doc) { if (doc.bar) { emit(doc._id, 1); } }");
        assert!(v.emit(&doc(json!({"_id": "a", "bar": true}))).is_some());
        assert!(v.emit(&doc(json!({"_id": "b", "bar": false}))).is_none());
        assert!(v.emit(&doc(json!({"_id": "c"}))).is_none());
    }

    #[test]
    fn reducers() {
        let values = [json!(1), json!(2), json!(4)];
        assert_eq!(Reducer::Count.reduce(values.iter()), json!(3));
        assert_eq!(Reducer::Sum.reduce(values.iter()), json!(7));

        let definition = json!({"map": "function (doc) { emit(doc._id, 1); }", "reduce": "_count"});
        assert_eq!(
            ViewDefinition::parse(&definition).unwrap().reducer(),
            Some(Reducer::Count)
        );
    }

    #[test]
    fn rejects_unknown_code() {
        let err = ViewDefinition::parse(&json!({"map": "function (doc) { emit(doc.a + 1, null); }"}))
            .unwrap_err();
        assert_eq!(err.status(), 501);

        let err = ViewDefinition::parse(&json!({
            "map": "function (doc) { emit(doc._id, null); }",
            "reduce": "function (keys, values) { return sum(values); }"
        }))
        .unwrap_err();
        assert_eq!(err.status(), 501);
    }
}
