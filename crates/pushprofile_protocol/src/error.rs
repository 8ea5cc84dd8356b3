//! Error types for the protocol crate.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while building requests or decoding payloads.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A request could not be built from the given arguments.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A response that must carry a body came back empty.
    #[error("missing response body for {0}")]
    MissingBody(&'static str),
}

impl ProtocolError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }
}
