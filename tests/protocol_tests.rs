#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Wire-format tests for the room protocol.
//!
//! Decodes JSON fixtures shaped like real server output, checks the exact
//! JSON produced for every outbound command, and pins the `ErrorCode`
//! SCREAMING_SNAKE_CASE names.

use piano_room_client::codec::{decode_frame, encode, encode_frame};
use piano_room_client::error_codes::ErrorCode;
use piano_room_client::protocol::{
    AuthorRef, ClientMessage, Inbound, ParticipantInfo, RoomInfo, ServerMessage, UserSettings,
};
use piano_room_client::{Participant, SessionError};

/// Decode a frame that must contain exactly one valid message.
fn decode_one(frame: &str) -> Inbound {
    let mut decoded = decode_frame(frame).expect("frame");
    assert_eq!(decoded.len(), 1, "expected one element in {frame}");
    decoded.remove(0).expect("element")
}

// ════════════════════════════════════════════════════════════════════
// Outbound commands
// ════════════════════════════════════════════════════════════════════

#[test]
fn handshake_with_and_without_token() {
    assert_eq!(
        encode(&ClientMessage::Handshake { token: None }).unwrap(),
        r#"[{"m":"hi"}]"#
    );
    assert_eq!(
        encode(&ClientMessage::Handshake {
            token: Some("abc".into())
        })
        .unwrap(),
        r#"[{"m":"hi","token":"abc"}]"#
    );
}

#[test]
fn room_and_user_commands() {
    assert_eq!(
        encode(&ClientMessage::SetRoom {
            room: "lobby".into()
        })
        .unwrap(),
        r#"[{"m":"ch","_id":"lobby"}]"#
    );
    assert_eq!(
        encode(&ClientMessage::SetUser {
            set: UserSettings {
                name: "Alice".into()
            }
        })
        .unwrap(),
        r#"[{"m":"userset","set":{"name":"Alice"}}]"#
    );
}

#[test]
fn heartbeat_and_cursor_carry_numbers() {
    let json = encode(&ClientMessage::Heartbeat {
        client_time: 1_700_000_000_123.0,
    })
    .unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value[0]["m"], "t");
    assert_eq!(value[0]["e"], 1_700_000_000_123.0);

    let json = encode(&ClientMessage::Cursor { x: 12.5, y: 80.0 }).unwrap();
    assert_eq!(json, r#"[{"m":"m","x":12.5,"y":80.0}]"#);
}

#[test]
fn several_commands_share_one_frame() {
    let json = encode_frame(&[
        ClientMessage::SetRoom {
            room: "lobby".into(),
        },
        ClientMessage::Chat {
            message: "hello".into(),
        },
    ])
    .unwrap();
    assert_eq!(
        json,
        r#"[{"m":"ch","_id":"lobby"},{"m":"a","message":"hello"}]"#
    );
}

#[test]
fn only_room_and_user_commands_may_wait() {
    let queueable = [
        ClientMessage::SetRoom { room: "r".into() },
        ClientMessage::SetUser {
            set: UserSettings { name: "n".into() },
        },
    ];
    let immediate = [
        ClientMessage::Handshake { token: None },
        ClientMessage::Heartbeat { client_time: 0.0 },
        ClientMessage::Chat {
            message: "x".into(),
        },
        ClientMessage::Cursor { x: 0.0, y: 0.0 },
    ];
    assert!(queueable.iter().all(ClientMessage::is_queueable));
    assert!(!immediate.iter().any(ClientMessage::is_queueable));
}

// ════════════════════════════════════════════════════════════════════
// Inbound fixtures
// ════════════════════════════════════════════════════════════════════

#[test]
fn hello_fixture() {
    let inbound = decode_one(
        r##"[{"m":"hi","t":1700000000000,"u":{"_id":"f00d","name":"Anonymous","color":"#8d3f50"},"motd":"welcome"}]"##,
    );
    let Inbound::Message(ServerMessage::Hello { server_time, user }) = inbound else {
        panic!("expected hello, got {inbound:?}");
    };
    assert_eq!(server_time, Some(1_700_000_000_000.0));
    assert_eq!(user.unwrap().id, "f00d");
}

#[test]
fn room_snapshot_fixture_ignores_extra_fields() {
    let inbound = decode_one(
        r##"[{"m":"ch","ch":{"_id":"lobby","settings":{"visible":true,"color":"#ecfaed"},"count":2},
              "ppl":[{"_id":"a1","name":"Alice","color":"#fff"},
                     {"_id":"b2","name":"Botty","tag":"bot"}],
              "p":"a1"}]"##,
    );
    let Inbound::Message(ServerMessage::RoomSnapshot { room, participants }) = inbound else {
        panic!("expected snapshot, got {inbound:?}");
    };
    assert_eq!(
        room,
        Some(RoomInfo {
            id: "lobby".into()
        })
    );
    let people: Vec<Participant> = participants.into_iter().map(Participant::from).collect();
    assert_eq!(people[0].role, "user");
    assert_eq!(people[1].role, "bot");
}

#[test]
fn snapshot_without_people_is_empty() {
    let inbound = decode_one(r#"[{"m":"ch"}]"#);
    assert_eq!(
        inbound,
        Inbound::Message(ServerMessage::RoomSnapshot {
            room: None,
            participants: vec![],
        })
    );
}

#[test]
fn chat_join_leave_and_time_fixtures() {
    let decoded = decode_frame(
        r#"[{"m":"a","a":"hello","p":{"_id":"a1","name":"Alice"},"t":1},
            {"m":"p","_id":"c3","name":"Carol","x":50,"y":50},
            {"m":"bye","p":"c3"},
            {"m":"t","t":1700000000500,"e":1700000000400}]"#,
    )
    .unwrap();
    let decoded: Vec<Inbound> = decoded.into_iter().map(Result::unwrap).collect();

    assert_eq!(
        decoded,
        vec![
            Inbound::Message(ServerMessage::Chat {
                text: "hello".into(),
                author: AuthorRef {
                    id: "a1".into(),
                    name: Some("Alice".into()),
                },
            }),
            Inbound::Message(ServerMessage::ParticipantJoin(ParticipantInfo {
                id: "c3".into(),
                name: "Carol".into(),
                tag: None,
            })),
            Inbound::Message(ServerMessage::ParticipantLeave { id: "c3".into() }),
            Inbound::Message(ServerMessage::TimeSync {
                server_time: 1_700_000_000_500.0,
                echoed_time: Some(1_700_000_000_400.0),
            }),
        ]
    );
}

#[test]
fn only_handshake_time_and_snapshot_bypass_the_queue() {
    let frame = r#"[{"m":"hi"},{"m":"t","t":1},{"m":"ch"},
                    {"m":"a","a":"x","p":{"_id":"a"}},{"m":"p","_id":"a","name":"A"},
                    {"m":"bye","p":"a"},{"m":"n","n":[]},{"m":"custom"}]"#;
    let bypass: Vec<bool> = decode_frame(frame)
        .unwrap()
        .into_iter()
        .map(|r| r.unwrap().bypasses_queue())
        .collect();
    assert_eq!(
        bypass,
        vec![true, true, true, false, false, false, false, false]
    );
}

#[test]
fn broken_frames_are_protocol_violations() {
    for frame in ["", "nope", "{}", r#""text""#, "42"] {
        assert!(
            matches!(decode_frame(frame), Err(SessionError::ProtocolViolation(_))),
            "{frame:?}"
        );
    }
}

#[test]
fn known_opcode_with_wrong_body_is_a_violation() {
    let decoded = decode_frame(r#"[{"m":"a","a":5},{"m":"t"}]"#).unwrap();
    assert!(decoded
        .iter()
        .all(|r| matches!(r, Err(SessionError::ProtocolViolation(_)))));
}

// ════════════════════════════════════════════════════════════════════
// Error codes
// ════════════════════════════════════════════════════════════════════

#[test]
fn error_codes_serialize_screaming_snake_case() {
    let cases = [
        (ErrorCode::InvalidType, "\"INVALID_TYPE\""),
        (ErrorCode::WsNotOpen, "\"WS_NOT_OPEN\""),
        (ErrorCode::ManagerDestroyed, "\"MANAGER_DESTROYED\""),
        (ErrorCode::ReconnectExhausted, "\"RECONNECT_EXHAUSTED\""),
    ];
    for (code, expected) in cases {
        assert_eq!(serde_json::to_string(&code).unwrap(), expected);
        let back: ErrorCode = serde_json::from_str(expected).unwrap();
        assert_eq!(back, code);
    }
}

#[test]
fn error_code_lookup_matches_names() {
    assert_eq!(ErrorCode::lookup("WS_NOT_OPEN"), Some(ErrorCode::WsNotOpen));
    assert_eq!(ErrorCode::lookup("NOT_A_CODE"), None);
    assert_eq!(
        ErrorCode::WsNotOpen.render(&["chat"]),
        "Websocket not open to send chat."
    );
}
