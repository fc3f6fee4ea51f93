//! Wire-compatible protocol types for room servers.
//!
//! Every message is a JSON object whose opcode lives in the `m` field, and
//! every frame on the socket is a JSON array of such objects (see
//! [`codec`](crate::codec)). Field names follow the server exactly, so the
//! Rust names are mapped with `#[serde(rename)]` where they differ.

use serde::{Deserialize, Serialize};

// ── Type aliases ────────────────────────────────────────────────────

/// Server-assigned participant identifier.
pub type ParticipantId = String;

/// Room identifier (the room's name on the server).
pub type RoomId = String;

/// Role assigned to participants whose `tag` is absent.
pub const DEFAULT_ROLE: &str = "user";

// ── Opcodes ─────────────────────────────────────────────────────────

/// Opcode strings as they appear in the `m` field.
pub mod opcode {
    pub const HELLO: &str = "hi";
    pub const TIME: &str = "t";
    pub const ROOM: &str = "ch";
    pub const SET_USER: &str = "userset";
    pub const CHAT: &str = "a";
    pub const PARTICIPANT: &str = "p";
    pub const BYE: &str = "bye";
    pub const CURSOR: &str = "m";
}

// ── Structs ─────────────────────────────────────────────────────────

/// A participant as described by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantInfo {
    #[serde(rename = "_id")]
    pub id: ParticipantId,
    pub name: String,
    /// Role tag such as `"bot"` or `"admin"`; `None` means a plain user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

/// The author reference attached to a chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorRef {
    #[serde(rename = "_id")]
    pub id: ParticipantId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Room metadata carried by a room snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomInfo {
    #[serde(rename = "_id")]
    pub id: RoomId,
}

/// Settings payload of a `userset` command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    pub name: String,
}

// ── Messages ────────────────────────────────────────────────────────

/// Commands sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "m")]
pub enum ClientMessage {
    /// Open the session; carries the auth token when one is configured.
    #[serde(rename = "hi")]
    Handshake {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },
    /// Heartbeat and time request; `e` is the local send time in ms.
    #[serde(rename = "t")]
    Heartbeat {
        #[serde(rename = "e")]
        client_time: f64,
    },
    /// Join (or create) a room.
    #[serde(rename = "ch")]
    SetRoom {
        #[serde(rename = "_id")]
        room: RoomId,
    },
    /// Change the local display name.
    #[serde(rename = "userset")]
    SetUser { set: UserSettings },
    /// Post a chat line to the current room.
    #[serde(rename = "a")]
    Chat { message: String },
    /// Report the local cursor position.
    #[serde(rename = "m")]
    Cursor { x: f64, y: f64 },
}

impl ClientMessage {
    /// The wire opcode of this command.
    pub fn opcode(&self) -> &'static str {
        match self {
            Self::Handshake { .. } => opcode::HELLO,
            Self::Heartbeat { .. } => opcode::TIME,
            Self::SetRoom { .. } => opcode::ROOM,
            Self::SetUser { .. } => opcode::SET_USER,
            Self::Chat { .. } => opcode::CHAT,
            Self::Cursor { .. } => opcode::CURSOR,
        }
    }

    /// Whether this command may wait in the pending queue until the session
    /// is ready. Everything else requested before ready is rejected.
    pub fn is_queueable(&self) -> bool {
        matches!(self, Self::SetRoom { .. } | Self::SetUser { .. })
    }
}

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "m")]
pub enum ServerMessage {
    /// Handshake acknowledgement.
    #[serde(rename = "hi")]
    Hello {
        #[serde(rename = "t", default, skip_serializing_if = "Option::is_none")]
        server_time: Option<f64>,
        /// The local participant as the server sees it.
        #[serde(rename = "u", default, skip_serializing_if = "Option::is_none")]
        user: Option<ParticipantInfo>,
    },
    /// Room snapshot with the current participant list.
    #[serde(rename = "ch")]
    RoomSnapshot {
        #[serde(rename = "ch", default, skip_serializing_if = "Option::is_none")]
        room: Option<RoomInfo>,
        #[serde(rename = "ppl", default)]
        participants: Vec<ParticipantInfo>,
    },
    /// Chat line from a participant.
    #[serde(rename = "a")]
    Chat {
        #[serde(rename = "a")]
        text: String,
        #[serde(rename = "p")]
        author: AuthorRef,
    },
    /// A participant joined or changed name/role.
    #[serde(rename = "p")]
    ParticipantJoin(ParticipantInfo),
    /// A participant left.
    #[serde(rename = "bye")]
    ParticipantLeave {
        #[serde(rename = "p")]
        id: ParticipantId,
    },
    /// Server clock reading, with the echoed client time when replying to a
    /// heartbeat.
    #[serde(rename = "t")]
    TimeSync {
        #[serde(rename = "t")]
        server_time: f64,
        #[serde(rename = "e", default, skip_serializing_if = "Option::is_none")]
        echoed_time: Option<f64>,
    },
}

impl ServerMessage {
    /// The wire opcode of this message.
    pub fn opcode(&self) -> &'static str {
        match self {
            Self::Hello { .. } => opcode::HELLO,
            Self::RoomSnapshot { .. } => opcode::ROOM,
            Self::Chat { .. } => opcode::CHAT,
            Self::ParticipantJoin(_) => opcode::PARTICIPANT,
            Self::ParticipantLeave { .. } => opcode::BYE,
            Self::TimeSync { .. } => opcode::TIME,
        }
    }

    /// Whether this message is processed even before the session is ready.
    ///
    /// These are exactly the messages needed to reach the ready state.
    pub fn bypasses_queue(&self) -> bool {
        matches!(
            self,
            Self::Hello { .. } | Self::TimeSync { .. } | Self::RoomSnapshot { .. }
        )
    }

    /// Whether `opcode` names one of the typed variants above.
    pub fn is_known_opcode(opcode: &str) -> bool {
        matches!(
            opcode,
            opcode::HELLO
                | opcode::ROOM
                | opcode::CHAT
                | opcode::PARTICIPANT
                | opcode::BYE
                | opcode::TIME
        )
    }
}

/// One decoded element of an inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A message the session understands.
    Message(ServerMessage),
    /// Any other opcode, forwarded untouched to listeners.
    Other {
        opcode: String,
        payload: serde_json::Value,
    },
}

impl Inbound {
    /// The wire opcode of this element.
    pub fn opcode(&self) -> &str {
        match self {
            Self::Message(msg) => msg.opcode(),
            Self::Other { opcode, .. } => opcode,
        }
    }

    /// See [`ServerMessage::bypasses_queue`]. Forwarded opcodes always queue.
    pub fn bypasses_queue(&self) -> bool {
        match self {
            Self::Message(msg) => msg.bypasses_queue(),
            Self::Other { .. } => false,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn handshake_omits_missing_token() {
        let msg = ClientMessage::Handshake { token: None };
        assert_eq!(serde_json::to_value(&msg).unwrap(), json!({ "m": "hi" }));
    }

    #[test]
    fn set_user_nests_name() {
        let msg = ClientMessage::SetUser {
            set: UserSettings {
                name: "Alice".into(),
            },
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({ "m": "userset", "set": { "name": "Alice" } })
        );
    }

    #[test]
    fn participant_join_reads_flat_fields() {
        let msg: ServerMessage =
            serde_json::from_value(json!({ "m": "p", "_id": "a", "name": "Alice", "tag": "bot" }))
                .unwrap();
        assert_eq!(
            msg,
            ServerMessage::ParticipantJoin(ParticipantInfo {
                id: "a".into(),
                name: "Alice".into(),
                tag: Some("bot".into()),
            })
        );
    }

    #[test]
    fn snapshot_without_room_or_people_defaults() {
        let msg: ServerMessage = serde_json::from_value(json!({ "m": "ch" })).unwrap();
        assert_eq!(
            msg,
            ServerMessage::RoomSnapshot {
                room: None,
                participants: vec![],
            }
        );
    }

    #[test]
    fn queue_whitelists() {
        assert!(ClientMessage::SetRoom { room: "x".into() }.is_queueable());
        assert!(!ClientMessage::Chat {
            message: "x".into()
        }
        .is_queueable());
        assert!(ServerMessage::TimeSync {
            server_time: 1.0,
            echoed_time: None
        }
        .bypasses_queue());
        assert!(!ServerMessage::ParticipantLeave { id: "a".into() }.bypasses_queue());
    }

    #[test]
    fn known_opcodes_match_variants() {
        for op in ["hi", "ch", "a", "p", "bye", "t"] {
            assert!(ServerMessage::is_known_opcode(op), "{op}");
        }
        assert!(!ServerMessage::is_known_opcode("n"));
        assert!(!ServerMessage::is_known_opcode("m"));
    }
}
