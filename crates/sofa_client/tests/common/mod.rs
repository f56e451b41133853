//! Sessions against the in-memory server.

#![allow(dead_code)]

use sofa_client::{ClientConfig, CouchSession, Database, LoopbackClient};
use sofa_testkit::MemoryServer;
use std::sync::Arc;

pub fn session(server: &Arc<MemoryServer>) -> CouchSession {
    session_with(server, ClientConfig::default())
}

pub fn session_with(server: &Arc<MemoryServer>, config: ClientConfig) -> CouchSession {
    CouchSession::with_client(config, Arc::new(LoopbackClient::new(Arc::clone(server))))
}

pub fn login(server: &Arc<MemoryServer>, user: &str, password: &str) -> CouchSession {
    session_with(server, ClientConfig::default().with_credentials(user, password))
}

/// The sample database of `sofa_testkit::server_with_documents`, opened through a session.
pub async fn sample_database(name: &str) -> (Arc<MemoryServer>, Database) {
    let server = sofa_testkit::server_with_documents(name);
    let db = session(&server).database(name).await.unwrap();
    (server, db)
}
