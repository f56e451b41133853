//! Mango selector evaluation and sorting for `_find`.

use crate::collate::collate;
use crate::error::{ServerError, ServerResult};
use serde_json::Value;
use sofa_protocol::JsonObject;
use std::cmp::Ordering;

/// True if `doc` satisfies `selector`.
///
/// Supported: implicit equality, `$eq`, `$ne`, `$gt`, `$gte`, `$lt`,
/// `$lte`, `$in`, `$nin`, `$exists`, `$and`, `$or`, `$nor`, `$not` and
/// dotted field paths.
pub fn matches(selector: &Value, doc: &JsonObject) -> ServerResult<bool> {
    let Value::Object(conditions) = selector else {
        return Err(ServerError::BadRequest("selector must be a JSON object".into()));
    };

    for (field, condition) in conditions {
        let satisfied = match field.as_str() {
            "$and" => all_of(condition, doc)?,
            "$or" => any_of(condition, doc)?,
            "$nor" => !any_of(condition, doc)?,
            "$not" => !matches(condition, doc)?,
            _ => field_matches(lookup(doc, field), condition)?,
        };
        if !satisfied {
            return Ok(false);
        }
    }
    Ok(true)
}

fn selectors(condition: &Value) -> ServerResult<&Vec<Value>> {
    condition
        .as_array()
        .ok_or_else(|| ServerError::BadRequest("combination operators take an array".into()))
}

fn all_of(condition: &Value, doc: &JsonObject) -> ServerResult<bool> {
    for selector in selectors(condition)? {
        if !matches(selector, doc)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn any_of(condition: &Value, doc: &JsonObject) -> ServerResult<bool> {
    for selector in selectors(condition)? {
        if matches(selector, doc)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn lookup<'a>(doc: &'a JsonObject, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = doc.get(segments.next()?)?;
    for segment in segments {
        current = current.get(segment)?;
    }
    Some(current)
}

fn field_matches(value: Option<&Value>, condition: &Value) -> ServerResult<bool> {
    let operators = match condition {
        Value::Object(map) if map.keys().any(|k| k.starts_with('$')) => map,
        other => return Ok(value.is_some_and(|v| collate(v, other) == Ordering::Equal)),
    };

    for (operator, operand) in operators {
        let satisfied = match operator.as_str() {
            "$exists" => value.is_some() == operand.as_bool().unwrap_or(true),
            "$eq" => compare(value, operand, |o| o == Ordering::Equal),
            "$ne" => !compare(value, operand, |o| o == Ordering::Equal),
            "$gt" => compare(value, operand, |o| o == Ordering::Greater),
            "$gte" => compare(value, operand, |o| o != Ordering::Less),
            "$lt" => compare(value, operand, |o| o == Ordering::Less),
            "$lte" => compare(value, operand, |o| o != Ordering::Greater),
            "$in" => in_list(value, operand)?,
            "$nin" => value.is_some() && !in_list(value, operand)?,
            other => {
                return Err(ServerError::NotImplemented(format!(
                    "operator {} is not supported by the in-memory server",
                    other
                )))
            }
        };
        if !satisfied {
            return Ok(false);
        }
    }
    Ok(true)
}

fn compare(value: Option<&Value>, operand: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    value.is_some_and(|v| accept(collate(v, operand)))
}

fn in_list(value: Option<&Value>, operand: &Value) -> ServerResult<bool> {
    let candidates = operand
        .as_array()
        .ok_or_else(|| ServerError::BadRequest("$in and $nin take an array".into()))?;
    Ok(value.is_some_and(|v| candidates.iter().any(|c| collate(v, c) == Ordering::Equal)))
}

/// One `sort` entry: field and direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortField {
    field: String,
    descending: bool,
}

/// Parses `["a", {"b": "desc"}]`.
pub fn parse_sort(sort: &Value) -> ServerResult<Vec<SortField>> {
    let entries = sort
        .as_array()
        .ok_or_else(|| ServerError::BadRequest("sort must be an array".into()))?;

    entries
        .iter()
        .map(|entry| match entry {
            Value::String(field) => Ok(SortField {
                field: field.clone(),
                descending: false,
            }),
            Value::Object(map) if map.len() == 1 => {
                let (field, direction) = map
                    .iter()
                    .next()
                    .ok_or_else(|| ServerError::BadRequest("empty sort entry".into()))?;
                match direction.as_str() {
                    Some("asc") => Ok(SortField {
                        field: field.clone(),
                        descending: false,
                    }),
                    Some("desc") => Ok(SortField {
                        field: field.clone(),
                        descending: true,
                    }),
                    _ => Err(ServerError::BadRequest(format!(
                        "Invalid sort direction for field '{}'",
                        field
                    ))),
                }
            }
            _ => Err(ServerError::BadRequest("Invalid sort entry".into())),
        })
        .collect()
}

/// Orders two documents by the sort fields; missing fields sort first.
pub fn compare_docs(sort: &[SortField], a: &JsonObject, b: &JsonObject) -> Ordering {
    for field in sort {
        let left = lookup(a, &field.field).unwrap_or(&Value::Null);
        let right = lookup(b, &field.field).unwrap_or(&Value::Null);
        let ordering = collate(left, right);
        let ordering = if field.descending {
            ordering.reverse()
        } else {
            ordering
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
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

    #[test]
    fn equality_and_operators() {
        let foo = doc(json!({"bar": true, "bar2": 3, "address": {"city": "Dresden"}}));

        assert!(matches(&json!({}), &foo).unwrap());
        assert!(matches(&json!({"bar": true}), &foo).unwrap());
        assert!(!matches(&json!({"bar": false}), &foo).unwrap());
        assert!(matches(&json!({"bar2": {"$gt": 2, "$lte": 3}}), &foo).unwrap());
        assert!(matches(&json!({"address.city": "Dresden"}), &foo).unwrap());
        assert!(matches(&json!({"missing": {"$exists": false}}), &foo).unwrap());
        assert!(matches(&json!({"bar2": {"$in": [1, 3]}}), &foo).unwrap());
        assert!(!matches(&json!({"missing": "x"}), &foo).unwrap());
    }

    #[test]
    fn combinations() {
        let foo = doc(json!({"bar": true, "bar2": 3}));
        assert!(matches(&json!({"$or": [{"bar": false}, {"bar2": 3}]}), &foo).unwrap());
        assert!(!matches(&json!({"$and": [{"bar": true}, {"bar2": 4}]}), &foo).unwrap());
        assert!(matches(&json!({"$nor": [{"bar": false}]}), &foo).unwrap());
    }

    #[test]
    fn unknown_operator_is_not_implemented() {
        let err = matches(&json!({"a": {"$regex": "^x"}}), &doc(json!({"a": "x"}))).unwrap_err();
        assert_eq!(err.status(), 501);
    }

    #[test]
    fn sorting() {
        let sort = parse_sort(&json!([{"bar2": "desc"}])).unwrap();
        let a = doc(json!({"bar2": 1}));
        let b = doc(json!({"bar2": 2}));
        assert_eq!(compare_docs(&sort, &a, &b), Ordering::Greater);

        let sort = parse_sort(&json!(["bar2"])).unwrap();
        assert_eq!(compare_docs(&sort, &a, &b), Ordering::Less);

        assert!(parse_sort(&json!([{"bar2": "sideways"}])).is_err());
    }
}
