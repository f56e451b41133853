//! # sofa testkit
//!
//! An in-memory CouchDB-compatible server and test utilities for sofa.
//!
//! This crate provides:
//! - `MemoryServer`, answering requests routed through the loopback seam
//! - Revision tracking with optimistic concurrency per document
//! - Basic authentication with admin party mode and `_security` checks
//! - `_all_docs`, simple map/reduce views, `_find`, `_changes` and `_purge`
//! - A request log for asserting what reached the server
//! - Fixtures and property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sofa_testkit::prelude::*;
//!
//! let server = server_with_documents("animals");
//! // hand `server` to a loopback transport and run the client against it
//! assert_eq!(server.log().len(), 0);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
mod collate;
mod config;
mod error;
pub mod fixtures;
pub mod generators;
mod handler;
mod log;
mod mango;
mod query;
mod server;
mod store;
mod views;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::{MemoryServer, RequestLog, ServerConfig};
}

pub use auth::{Account, Principal};
pub use collate::collate;
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use fixtures::*;
pub use generators::*;
pub use log::{LoggedRequest, RequestLog};
pub use query::ViewQuery;
pub use server::MemoryServer;
pub use store::{DatabaseStore, StoredAttachment};
