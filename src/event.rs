//! Events emitted by the session to its consumer.
//!
//! All events arrive on the single channel returned by
//! [`RoomClient::start`](crate::client::RoomClient::start); consumers match on
//! the variants they care about.

use crate::lifecycle::LifecycleState;
use crate::protocol::{ParticipantId, ParticipantInfo, RoomId, DEFAULT_ROLE};

/// A participant as tracked by the roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub id: ParticipantId,
    pub name: String,
    pub role: String,
}

impl Participant {
    /// Placeholder metadata for an identifier the roster has never seen.
    pub fn unknown(id: impl Into<ParticipantId>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            role: DEFAULT_ROLE.to_string(),
        }
    }
}

impl From<ParticipantInfo> for Participant {
    fn from(info: ParticipantInfo) -> Self {
        Self {
            id: info.id,
            name: info.name,
            role: info.tag.unwrap_or_else(|| DEFAULT_ROLE.to_string()),
        }
    }
}

/// The resolved author of a chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Author {
    /// The author is in the roster.
    Known(Participant),
    /// The author is not in the roster (e.g. the chat raced ahead of the
    /// join). `name` is whatever the message itself carried.
    Unknown {
        id: ParticipantId,
        name: Option<String>,
    },
}

impl Author {
    /// The author's identifier, known or not.
    pub fn id(&self) -> &str {
        match self {
            Self::Known(p) => &p.id,
            Self::Unknown { id, .. } => id,
        }
    }

    /// The best available display name.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Known(p) => Some(&p.name),
            Self::Unknown { name, .. } => name.as_deref(),
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Self::Known(_))
    }
}

/// A received chat line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub content: String,
    pub author: Author,
}

/// Events emitted by the session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The session finished its handshake and received the first room
    /// snapshot. Queued traffic has already been flushed.
    Ready,
    /// The socket was lost. Reconnection starts immediately afterwards.
    Disconnected { reason: Option<String> },
    /// The session is finished: destroyed by the caller, refused by the
    /// gateway, or out of reconnection attempts.
    Terminated { reason: String },
    /// The lifecycle moved between two states.
    StateChanged {
        from: LifecycleState,
        to: LifecycleState,
    },
    /// A room snapshot was applied to the roster.
    RoomSnapshot {
        room: Option<RoomId>,
        participants: Vec<Participant>,
    },
    ChatReceived(ChatMessage),
    ParticipantAdded(Participant),
    /// A known participant changed name or role.
    ParticipantUpdated(Participant),
    /// A participant left; carries the last known metadata.
    ParticipantRemoved(Participant),
    /// An opcode the session does not interpret (notes, cursors, ...).
    Opcode {
        opcode: String,
        payload: serde_json::Value,
    },
    /// Diagnostic text.
    Debug(String),
}

impl SessionEvent {
    /// Events that are delivered even when the channel is congested.
    pub(crate) fn is_critical(&self) -> bool {
        matches!(self, Self::Disconnected { .. } | Self::Terminated { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_tag_defaults_to_user_role() {
        let p = Participant::from(ParticipantInfo {
            id: "a".into(),
            name: "Alice".into(),
            tag: None,
        });
        assert_eq!(p.role, "user");
    }

    #[test]
    fn unknown_author_accessors() {
        let author = Author::Unknown {
            id: "z".into(),
            name: None,
        };
        assert_eq!(author.id(), "z");
        assert_eq!(author.name(), None);
        assert!(!author.is_known());
    }
}
