//! # sofa protocol
//!
//! Wire types shared by the sofa client and its in-memory reference server.
//!
//! This crate provides:
//! - HTTP request/response envelopes handed to transports
//! - The `LoopbackServer` seam used to route requests without a network
//! - Query parameter encoding
//! - Reserved document keys and write/bulk-write status rows
//! - View, `_find` and `_changes` response shapes
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod changes;
mod document;
mod error;
mod find;
mod http;
mod params;
mod view;

pub use changes::{ChangeRev, ChangeRow, ChangesResponse};
pub use document::{
    is_reserved, BulkDocStatus, BulkDocsRequest, ErrorBody, JsonObject, WriteResponse,
    ATTACHMENTS_KEY, DELETED_KEY, ID_KEY, REV_KEY,
};
pub use error::{ProtocolError, ProtocolResult};
pub use find::{FindRequest, FindResponse};
pub use http::{canonical_reason, Credentials, HttpRequest, HttpResponse, LoopbackServer, Method};
pub use params::Params;
pub use view::{KeysRequest, ViewResponse, ViewRow};
