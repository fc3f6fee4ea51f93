//! Named error-message registry.
//!
//! Every condition the session reports by name has a stable
//! `SCREAMING_SNAKE_CASE` identifier and a human-readable message. Messages
//! that take arguments are rendered with [`ErrorCode::render`]; the plain
//! [`ErrorCode::message`] fills those slots with neutral defaults.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Named conditions reported by the session layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Argument errors
    InvalidType,
    EmptyMessage,
    GatewayUnresolved,

    // Socket errors
    WsNotOpen,
    WsConnectionExists,
    WsCloseRequested,

    // Session errors
    ManagerDestroyed,
    ReconnectExhausted,
    Unauthorized,
    MalformedFrame,
    QueueFull,
}

impl ErrorCode {
    /// Resolve a registry name such as `"WS_NOT_OPEN"`.
    ///
    /// ```
    /// use piano_room_client::ErrorCode;
    ///
    /// assert_eq!(ErrorCode::lookup("WS_NOT_OPEN"), Some(ErrorCode::WsNotOpen));
    /// assert_eq!(ErrorCode::lookup("NOPE"), None);
    /// ```
    pub fn lookup(name: &str) -> Option<Self> {
        serde_json::from_value(serde_json::Value::String(name.to_string())).ok()
    }

    /// The registry name of this code.
    pub fn name(&self) -> &'static str {
        match self {
            Self::InvalidType => "INVALID_TYPE",
            Self::EmptyMessage => "EMPTY_MESSAGE",
            Self::GatewayUnresolved => "GATEWAY_UNRESOLVED",
            Self::WsNotOpen => "WS_NOT_OPEN",
            Self::WsConnectionExists => "WS_CONNECTION_EXISTS",
            Self::WsCloseRequested => "WS_CLOSE_REQUESTED",
            Self::ManagerDestroyed => "MANAGER_DESTROYED",
            Self::ReconnectExhausted => "RECONNECT_EXHAUSTED",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::MalformedFrame => "MALFORMED_FRAME",
            Self::QueueFull => "QUEUE_FULL",
        }
    }

    /// Message text with any argument slots filled by defaults.
    pub fn message(&self) -> &'static str {
        match self {
            Self::InvalidType => "Supplied value is not of the expected type.",
            Self::EmptyMessage => "Cannot send an empty message.",
            Self::GatewayUnresolved => "No gateway endpoint could be resolved from the configuration.",
            Self::WsNotOpen => "Websocket not open to send data.",
            Self::WsConnectionExists => "There is already an existing WebSocket connection.",
            Self::WsCloseRequested => "WebSocket closed due to user request.",
            Self::ManagerDestroyed => "The session was destroyed and cannot be used again.",
            Self::ReconnectExhausted => "Gave up after exhausting all reconnection attempts.",
            Self::Unauthorized => "The gateway rejected the supplied credentials.",
            Self::MalformedFrame => "Received a frame that is not a JSON array of messages.",
            Self::QueueFull => "The pending message queue is full.",
        }
    }

    /// Render the message with caller-supplied arguments.
    ///
    /// Only parameterized codes consume arguments; extra or missing ones fall
    /// back to [`message`](Self::message).
    ///
    /// ```
    /// use piano_room_client::ErrorCode;
    ///
    /// assert_eq!(
    ///     ErrorCode::WsNotOpen.render(&["chat"]),
    ///     "Websocket not open to send chat."
    /// );
    /// assert_eq!(
    ///     ErrorCode::InvalidType.render(&["room", "string"]),
    ///     "Supplied room is not a string."
    /// );
    /// ```
    pub fn render(&self, args: &[&str]) -> String {
        match (self, args) {
            (Self::InvalidType, [name, expected]) => {
                let article = if expected.starts_with(['a', 'e', 'i', 'o', 'u']) {
                    "an"
                } else {
                    "a"
                };
                format!("Supplied {name} is not {article} {expected}.")
            }
            (Self::WsNotOpen, [what]) => format!("Websocket not open to send {what}."),
            _ => self.message().to_string(),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}
