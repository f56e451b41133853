//! Error types for the in-memory server.

use sofa_protocol::{ErrorBody, HttpResponse};
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors the server answers with. Each maps to one HTTP status.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServerError {
    /// Malformed request (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing or wrong credentials (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not allowed (403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Unknown database, document or attachment (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Unsupported method for the endpoint (405).
    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),

    /// Stale or missing revision (409).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Database already exists (412).
    #[error("file exists: {0}")]
    FileExists(String),

    /// Request too large (413).
    #[error("too large: {0}")]
    TooLarge(String),

    /// Internal error; also how older servers refuse `_security` writes (500).
    #[error("internal error: {0}")]
    Internal(String),

    /// Feature outside the supported subset (501).
    #[error("not implemented: {0}")]
    NotImplemented(String),
}

impl ServerError {
    /// HTTP status of the error.
    pub fn status(&self) -> u16 {
        match self {
            ServerError::BadRequest(_) => 400,
            ServerError::Unauthorized(_) => 401,
            ServerError::Forbidden(_) => 403,
            ServerError::NotFound(_) => 404,
            ServerError::MethodNotAllowed(_) => 405,
            ServerError::Conflict(_) => 409,
            ServerError::FileExists(_) => 412,
            ServerError::TooLarge(_) => 413,
            ServerError::Internal(_) => 500,
            ServerError::NotImplemented(_) => 501,
        }
    }

    /// Short error name as used in the `error` field.
    pub fn name(&self) -> &'static str {
        match self {
            ServerError::BadRequest(_) => "bad_request",
            ServerError::Unauthorized(_) => "unauthorized",
            ServerError::Forbidden(_) => "forbidden",
            ServerError::NotFound(_) => "not_found",
            ServerError::MethodNotAllowed(_) => "method_not_allowed",
            ServerError::Conflict(_) => "conflict",
            ServerError::FileExists(_) => "file_exists",
            ServerError::TooLarge(_) => "too_large",
            ServerError::Internal(_) => "unknown_error",
            ServerError::NotImplemented(_) => "not_implemented",
        }
    }

    /// Human readable reason.
    pub fn reason(&self) -> &str {
        match self {
            ServerError::BadRequest(r)
            | ServerError::Unauthorized(r)
            | ServerError::Forbidden(r)
            | ServerError::NotFound(r)
            | ServerError::MethodNotAllowed(r)
            | ServerError::Conflict(r)
            | ServerError::FileExists(r)
            | ServerError::TooLarge(r)
            | ServerError::Internal(r)
            | ServerError::NotImplemented(r) => r,
        }
    }

    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status())
    }

    /// Renders the error as a JSON response.
    pub fn into_response(self) -> HttpResponse {
        HttpResponse::json(self.status(), &ErrorBody::new(self.name(), self.reason()))
    }

    pub(crate) fn missing() -> Self {
        ServerError::NotFound("missing".into())
    }

    pub(crate) fn deleted() -> Self {
        ServerError::NotFound("deleted".into())
    }

    pub(crate) fn update_conflict() -> Self {
        ServerError::Conflict("Document update conflict.".into())
    }
}

impl From<sofa_protocol::ProtocolError> for ServerError {
    fn from(err: sofa_protocol::ProtocolError) -> Self {
        ServerError::BadRequest(err.to_string())
    }
}

impl From<serde_json::Error> for ServerError {
    fn from(err: serde_json::Error) -> Self {
        ServerError::BadRequest(format!("invalid JSON: {}", err))
    }
}
