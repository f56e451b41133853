//! Error types for the client.

use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The server rejected the request as malformed (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing or invalid credentials (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not allowed (403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The referenced resource does not exist (404), or a local lookup failed.
    #[error("not found: {0}")]
    NotFound(String),

    /// Local and remote revisions disagree (409), or local edits would be lost.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A precondition failed, e.g. the database already exists (412).
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// The server refused the content type (415).
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// The server refused an `Expect` header (417).
    #[error("expectation failed: {0}")]
    ExpectationFailed(String),

    /// A status the client has no specific mapping for.
    #[error("server error ({status}): {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Description including the request.
        message: String,
    },

    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// A caller supplied argument was rejected before any request was made.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A value had the wrong JSON type.
    #[error("invalid type: {0}")]
    InvalidType(String),

    /// Operation not permitted in the current state.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// The server answered with a payload the client cannot interpret.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<sofa_protocol::ProtocolError> for ClientError {
    fn from(err: sofa_protocol::ProtocolError) -> Self {
        match err {
            sofa_protocol::ProtocolError::Json(e) => ClientError::Json(e),
            other => ClientError::Protocol(other.to_string()),
        }
    }
}

/// The error kinds an HTTP status can map to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 400
    BadRequest,
    /// 401
    Unauthorized,
    /// 403
    Forbidden,
    /// 404
    NotFound,
    /// 409
    Conflict,
    /// 412
    PreconditionFailed,
    /// 415
    UnsupportedMediaType,
    /// 417
    ExpectationFailed,
}

impl ErrorKind {
    /// Looks up the kind for an HTTP status.
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            400 => Some(ErrorKind::BadRequest),
            401 => Some(ErrorKind::Unauthorized),
            403 => Some(ErrorKind::Forbidden),
            404 => Some(ErrorKind::NotFound),
            409 => Some(ErrorKind::Conflict),
            412 => Some(ErrorKind::PreconditionFailed),
            415 => Some(ErrorKind::UnsupportedMediaType),
            417 => Some(ErrorKind::ExpectationFailed),
            _ => None,
        }
    }

    /// Builds the error of this kind.
    pub fn into_error(self, message: impl Into<String>) -> ClientError {
        let message = message.into();
        match self {
            ErrorKind::BadRequest => ClientError::BadRequest(message),
            ErrorKind::Unauthorized => ClientError::Unauthorized(message),
            ErrorKind::Forbidden => ClientError::Forbidden(message),
            ErrorKind::NotFound => ClientError::NotFound(message),
            ErrorKind::Conflict => ClientError::Conflict(message),
            ErrorKind::PreconditionFailed => ClientError::PreconditionFailed(message),
            ErrorKind::UnsupportedMediaType => ClientError::UnsupportedMediaType(message),
            ErrorKind::ExpectationFailed => ClientError::ExpectationFailed(message),
        }
    }
}

impl ClientError {
    /// Maps an HTTP status to an error; unmapped statuses become [`ClientError::Server`].
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        match ErrorKind::from_status(status) {
            Some(kind) => kind.into_error(message),
            None => ClientError::Server {
                status,
                message: message.into(),
            },
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation(message.into())
    }

    /// Creates a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Returns the kind this error was mapped to, if it came from a mapped status.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ClientError::BadRequest(_) => Some(ErrorKind::BadRequest),
            ClientError::Unauthorized(_) => Some(ErrorKind::Unauthorized),
            ClientError::Forbidden(_) => Some(ErrorKind::Forbidden),
            ClientError::NotFound(_) => Some(ErrorKind::NotFound),
            ClientError::Conflict(_) => Some(ErrorKind::Conflict),
            ClientError::PreconditionFailed(_) => Some(ErrorKind::PreconditionFailed),
            ClientError::UnsupportedMediaType(_) => Some(ErrorKind::UnsupportedMediaType),
            ClientError::ExpectationFailed(_) => Some(ErrorKind::ExpectationFailed),
            _ => None,
        }
    }

    /// Returns true for [`ClientError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound(_))
    }

    /// Returns true for [`ClientError::Conflict`].
    pub fn is_conflict(&self) -> bool {
        matches!(self, ClientError::Conflict(_))
    }
}
