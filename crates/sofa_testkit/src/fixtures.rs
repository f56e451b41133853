//! Test fixtures and server helpers.
//!
//! Provides ready-made servers and sample documents for common scenarios.

use crate::config::ServerConfig;
use crate::server::MemoryServer;
use serde_json::{json, Value};
use sofa_protocol::JsonObject;
use std::sync::Arc;

/// Server admin name used by [`secured_server`].
pub const ADMIN_NAME: &str = "admin";
/// Server admin password used by [`secured_server`].
pub const ADMIN_PASSWORD: &str = "secret";
/// Regular user name used by [`secured_server`].
pub const USER_NAME: &str = "lennon";
/// Regular user password used by [`secured_server`].
pub const USER_PASSWORD: &str = "imagine";

/// Converts a JSON object literal into a document body.
///
/// # Panics
///
/// Panics if `value` is not an object.
pub fn object(value: Value) -> JsonObject {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// Four small documents: `foo`, `foo2`, `baz` and `baz2`.
///
/// Three of them have `bar == true`; `bar2` numbers them 1 to 4.
pub fn sample_documents() -> Vec<JsonObject> {
    vec![
        object(json!({"_id": "foo", "bar": true, "bar2": 3})),
        object(json!({"_id": "foo2", "bar": true, "bar2": 1})),
        object(json!({"_id": "baz", "bar": false, "bar2": 4})),
        object(json!({"_id": "baz2", "bar": true, "bar2": 2})),
    ]
}

/// A server in admin party mode with an empty database `db`.
pub fn server_with_database(db: &str) -> Arc<MemoryServer> {
    let server = MemoryServer::default();
    server.create_database(db).expect("Failed to create database");
    Arc::new(server)
}

/// A server in admin party mode whose database `db` holds [`sample_documents`].
pub fn server_with_documents(db: &str) -> Arc<MemoryServer> {
    let server = server_with_database(db);
    for doc in sample_documents() {
        server.put_document(db, doc).expect("Failed to store document");
    }
    server
}

/// A server with one admin ([`ADMIN_NAME`]) and one user ([`USER_NAME`],
/// role `beatles`) and an empty database `db`.
pub fn secured_server(db: &str) -> Arc<MemoryServer> {
    let config = ServerConfig::new()
        .with_admin(ADMIN_NAME, ADMIN_PASSWORD)
        .with_user(USER_NAME, USER_PASSWORD, ["beatles"]);
    let server = MemoryServer::new(config);
    server.create_database(db).expect("Failed to create database");
    Arc::new(server)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_server_holds_four_documents() {
        let server = server_with_documents("fixtures");
        for id in ["foo", "foo2", "baz", "baz2"] {
            assert!(server.document("fixtures", id).is_some(), "{id} missing");
        }
        assert_eq!(server.update_seq("fixtures").unwrap(), 4);
    }

    #[test]
    fn secured_server_requires_auth() {
        let server = secured_server("private");
        assert!(server.config().requires_auth());
        assert_eq!(server.database_names(), vec!["private".to_string()]);
    }
}
