//! View key collation.
//!
//! `null < false < true < numbers < strings < arrays < objects`. Strings
//! compare by code point; arrays and objects element by element.

use serde_json::Value;
use std::cmp::Ordering;

fn rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(false) => 1,
        Value::Bool(true) => 2,
        Value::Number(_) => 3,
        Value::String(_) => 4,
        Value::Array(_) => 5,
        Value::Object(_) => 6,
    }
}

/// Compares two view keys.
pub fn collate(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (left, right) in x.iter().zip(y) {
                let ordering = collate(left, right);
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => {
            for ((lk, lv), (rk, rv)) in x.iter().zip(y) {
                let ordering = lk.cmp(rk).then_with(|| collate(lv, rv));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => rank(a).cmp(&rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn type_order() {
        let ordered = [
            json!(null),
            json!(false),
            json!(true),
            json!(1),
            json!(2.5),
            json!("a"),
            json!("b"),
            json!([1]),
            json!([1, 2]),
            json!({"a": 1}),
        ];
        for pair in ordered.windows(2) {
            assert_eq!(collate(&pair[0], &pair[1]), Ordering::Less, "{pair:?}");
        }
    }

    #[test]
    fn prefix_sentinels_sort_last() {
        assert_eq!(collate(&json!("foo2"), &json!("foo\u{FFFF}")), Ordering::Less);
        assert_eq!(collate(&json!("foo\u{FFFF}"), &json!("fop")), Ordering::Less);
    }
}
