//! Error types for protocol encoding and decoding.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while encoding or decoding wire payloads.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// JSON (de)serialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The payload was well-formed JSON but had an unexpected shape.
    #[error("invalid structure: {0}")]
    InvalidStructure(String),

    /// A body was required but the message carried none.
    #[error("missing body")]
    MissingBody,
}

impl ProtocolError {
    /// Creates an invalid structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ProtocolError::invalid_structure("expected object");
        assert_eq!(err.to_string(), "invalid structure: expected object");
        assert_eq!(ProtocolError::MissingBody.to_string(), "missing body");
    }
}
