//! Shared helpers for unit tests: a session against the in-memory server.

use crate::config::ClientConfig;
use crate::database::Database;
use crate::http::LoopbackClient;
use crate::session::CouchSession;
use serde_json::json;
use sofa_testkit::MemoryServer;
use std::sync::Arc;

/// Creates an empty database `name` on a fresh in-memory server.
pub(crate) async fn database(name: &str) -> (Arc<MemoryServer>, Database) {
    database_with(name, ClientConfig::default()).await
}

pub(crate) async fn database_with(name: &str, config: ClientConfig) -> (Arc<MemoryServer>, Database) {
    let server = Arc::new(MemoryServer::default());
    let couch = CouchSession::with_client(config, Arc::new(LoopbackClient::new(Arc::clone(&server))));
    let db = couch.create(name, false).await.unwrap();
    (server, db)
}

/// A database holding `foo`, `foo2`, `baz` and `baz2`, written in that order.
pub(crate) async fn filled_database() -> (Arc<MemoryServer>, Database) {
    filled_database_with("filled", ClientConfig::default()).await
}

pub(crate) async fn filled_database_with(
    name: &str,
    config: ClientConfig,
) -> (Arc<MemoryServer>, Database) {
    let (server, db) = database_with(name, config).await;

    for (id, bar, bar2) in [
        ("foo", true, 3),
        ("foo2", true, 1),
        ("baz", false, 4),
        ("baz2", true, 2),
    ] {
        let mut doc = db.create(id, false, None).await.unwrap();
        doc.update([("bar", json!(bar)), ("bar2", json!(bar2))]);
        doc.save().await.unwrap();
    }
    (server, db)
}
