//! # sofa client
//!
//! Async client for CouchDB-compatible document databases.
//!
//! This crate provides:
//! - Cached documents with fingerprint-based dirty tracking
//! - Optimistic concurrency through revision tokens
//! - Batched writes through `_bulk_docs` with per-document outcomes
//! - The per-database security object
//! - Design documents, views, attachments, `_find` and `_changes`
//!
//! # Caching model
//!
//! A [`Document`] is a local copy of a server document. Mutating it never
//! performs I/O; [`Document::save`] writes it back if and only if the body
//! changed since the last synchronization. A stale revision is rejected by
//! the server with [`ClientError::Conflict`] and the client never merges on
//! its own.
//!
//! ```rust,ignore
//! use sofa_client::{ClientConfig, CouchSession};
//!
//! let couch = CouchSession::connect(ClientConfig::from_env())?;
//! let db = couch.create("zoo", true).await?;
//!
//! let mut doc = db.create("zebra", true, None).await?;
//! doc.insert("stripes", 42);
//! doc.save().await?;
//!
//! let mut bulk = db.update_docs(["zebra", "lion"], true).await?;
//! for doc in &mut bulk {
//!     doc.insert("fed", true);
//! }
//! bulk.commit().await?;
//! for failed in bulk.error().unwrap_or_default() {
//!     println!("{} was changed concurrently", failed.id());
//! }
//! ```
//!
//! # Concurrency
//!
//! Documents and bulk operations are plain values owned by one task.
//! Handles ([`CouchSession`], [`Database`]) are cheap to clone and share one
//! transport.

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod attachment;
mod bulk;
mod changes;
mod config;
mod database;
mod design;
mod document;
mod error;
mod find;
mod fingerprint;
mod http;
mod remote;
mod security;
mod session;
mod view;

#[cfg(test)]
mod testing;

pub use attachment::Attachment;
pub use bulk::{BulkOperation, BulkState};
pub use changes::{ChangeEvent, ChangedEvent, ChangesOptions, DeletedEvent};
pub use config::{ClientConfig, DEFAULT_FIND_PAGE_SIZE, DEFAULT_SERVER_URL};
pub use database::{Database, DatabaseInfo};
pub use design::{DesignDocument, ALLOWED_KEYS, DESIGN_PREFIX};
pub use document::{CopyResponse, Document, DocumentInfo, SECURITY_ID};
pub use error::{ClientError, ClientResult, ErrorKind};
pub use find::FindOptions;
pub use fingerprint::Fingerprint;
pub use http::{HttpClient, LoopbackClient, ReqwestClient};
pub use security::SecurityDocument;
pub use session::{CouchSession, UserContext};
pub use view::{DocsQuery, View, ViewResult};

pub use sofa_protocol::{JsonObject, Params};
