//! Property-based test generators using proptest.
//!
//! Provides strategies for generating documents the server accepts:
//! user keys never start with an underscore, database names follow the
//! naming rules.

use proptest::prelude::*;
use serde_json::{Number, Value};
use sofa_protocol::JsonObject;

/// Strategy for generating valid database names.
pub fn database_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_$()+/-]{0,15}").expect("Invalid regex")
}

/// Strategy for generating document ids that are neither design nor local ids.
pub fn document_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9][a-zA-Z0-9_.:-]{0,23}").expect("Invalid regex")
}

/// Strategy for generating object keys that are not reserved.
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-zA-Z0-9_]{0,11}").expect("Invalid regex")
}

/// Strategy for generating JSON scalars.
pub fn json_scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        (-1.0e9f64..1.0e9f64).prop_map(|f| Number::from_f64(f).map_or(Value::Null, Value::Number)),
        "[ -~]{0,16}".prop_map(Value::String),
    ]
}

/// Strategy for generating nested JSON values.
pub fn json_value_strategy() -> impl Strategy<Value = Value> {
    json_scalar_strategy().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map(field_name_strategy(), inner, 0..4)
                .prop_map(|map| Value::Object(map.into_iter().collect())),
        ]
    })
}

/// Strategy for generating document bodies without reserved members.
pub fn document_body_strategy() -> impl Strategy<Value = JsonObject> {
    prop::collection::btree_map(field_name_strategy(), json_value_strategy(), 0..6)
        .prop_map(|map| map.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::strategy::ValueTree;
    use proptest::test_runner::TestRunner;

    #[test]
    fn bodies_have_no_reserved_keys() {
        let mut runner = TestRunner::default();
        for _ in 0..50 {
            let body = document_body_strategy()
                .new_tree(&mut runner)
                .expect("Failed to generate body")
                .current();
            assert!(body.keys().all(|k| !k.starts_with('_')));
        }
    }

    proptest! {
        #[test]
        fn database_names_start_with_a_letter(name in database_name_strategy()) {
            prop_assert!(name.chars().next().is_some_and(|c| c.is_ascii_lowercase()));
        }

        #[test]
        fn document_ids_are_plain(id in document_id_strategy()) {
            prop_assert!(!id.starts_with('_'));
            prop_assert!(!id.contains('/'));
        }
    }
}
