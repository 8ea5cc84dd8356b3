//! Error types for the sync engine.

use pushprofile_protocol::ProtocolError;
use pushprofile_storage::StorageError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The current device has no push registration id to authorize the call.
    #[error("current installation has no push registration id")]
    NoRegistration,

    /// The other-device depersonalize path was used on the current device.
    #[error("cannot depersonalize the current installation through this call")]
    CantLogoutCurrentRegistration,

    /// Request construction failed or the failure could not be classified.
    #[error("unknown error: {0}")]
    UnknownError(String),

    /// The host could not be resolved or connected to.
    #[error("host unreachable: {0}")]
    HostUnreachable(String),

    /// The request timed out.
    #[error("operation timed out")]
    Timeout,

    /// Other network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The server rejected the request with a non-2xx status.
    #[error("server error {status}: {message_id} {text}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Service error id.
        message_id: String,
        /// Service error message.
        text: String,
    },

    /// The server replied with something the client cannot interpret.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Encoding or decoding a persisted snapshot failed.
    #[error("codec error: {0}")]
    Codec(String),

    /// Persistence failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The operation was dropped before it ran.
    #[error("operation cancelled")]
    Cancelled,
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error is transient and may be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::HostUnreachable(_) | SyncError::Timeout => true,
            SyncError::Transport { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// Returns true if this error was raised before any network call.
    pub fn is_local_validation(&self) -> bool {
        matches!(
            self,
            SyncError::NoRegistration | SyncError::CantLogoutCurrentRegistration
        )
    }
}

impl From<ProtocolError> for SyncError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::InvalidRequest(message) => SyncError::UnknownError(message),
            other => SyncError::Protocol(other.to_string()),
        }
    }
}
