//! Error types for the room session client.

use thiserror::Error;

use crate::error_codes::ErrorCode;

/// Errors that can occur when using the room session client.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The socket could not be opened or was lost. Retryable.
    #[error("connection failure: {0}")]
    ConnectionFailure(String),

    /// The gateway refused the credentials. Never retried.
    #[error("authorization failure: {0}")]
    AuthorizationFailure(String),

    /// A malformed or unexpected frame was received.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The session was torn down and cannot be used again.
    #[error("{}", ErrorCode::ManagerDestroyed.message())]
    SessionDestroyed,

    /// A caller-supplied argument was rejected before contacting the server.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation is not valid in the current lifecycle state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed.
    #[error("{}", ErrorCode::WsNotOpen.message())]
    TransportClosed,

    /// Failed to serialize or deserialize a wire message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// Whether the reconnection policy may retry after this error.
    ///
    /// Authorization failures, teardown and caller mistakes are final; every
    /// socket-level failure is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::AuthorizationFailure(_)
                | Self::SessionDestroyed
                | Self::InvalidArgument(_)
                | Self::InvalidState(_)
        )
    }

    /// Build an `InvalidArgument` carrying a registry message.
    pub(crate) fn invalid_argument(code: ErrorCode) -> Self {
        Self::InvalidArgument(code.message().to_string())
    }
}

/// A specialized [`Result`] type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
