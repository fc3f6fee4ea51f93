//! Frame encoding and decoding.
//!
//! The socket carries text frames holding a JSON array of message objects.
//! Outbound commands are always wrapped in an array, even when there is only
//! one. Inbound frames may batch any number of messages; each element is
//! decoded on its own so that one malformed element does not take the rest
//! of the frame down with it.

use serde_json::Value;

use crate::error::{Result, SessionError};
use crate::error_codes::ErrorCode;
use crate::protocol::{ClientMessage, Inbound, ServerMessage};

/// Serialize commands into one wire frame.
pub fn encode_frame(messages: &[ClientMessage]) -> Result<String> {
    Ok(serde_json::to_string(messages)?)
}

/// Serialize a single command into a one-element frame.
pub fn encode(message: &ClientMessage) -> Result<String> {
    encode_frame(std::slice::from_ref(message))
}

/// Decode an inbound frame.
///
/// Returns `Err` when the frame as a whole is unusable: not JSON, not an
/// array, or an array holding anything other than objects. Otherwise every
/// element yields its own result, in frame order: known opcodes decode into
/// [`ServerMessage`], unknown opcodes are passed through as
/// [`Inbound::Other`], and objects without a string `m` field, or whose body
/// does not match their known opcode, become
/// [`SessionError::ProtocolViolation`].
pub fn decode_frame(text: &str) -> Result<Vec<Result<Inbound>>> {
    let value: Value = serde_json::from_str(text).map_err(|e| {
        SessionError::ProtocolViolation(format!("{}: {e}", ErrorCode::MalformedFrame.message()))
    })?;

    let Value::Array(elements) = value else {
        return Err(SessionError::ProtocolViolation(
            ErrorCode::MalformedFrame.message().to_string(),
        ));
    };

    if let Some(stray) = elements.iter().find(|element| !element.is_object()) {
        return Err(SessionError::ProtocolViolation(format!(
            "{}: frame element is not an object: {stray}",
            ErrorCode::MalformedFrame.message()
        )));
    }

    Ok(elements.into_iter().map(decode_element).collect())
}

fn decode_element(element: Value) -> Result<Inbound> {
    let opcode = match element.get("m").and_then(Value::as_str) {
        Some(op) => op.to_string(),
        None => {
            return Err(SessionError::ProtocolViolation(format!(
                "message without opcode: {element}"
            )));
        }
    };

    if !ServerMessage::is_known_opcode(&opcode) {
        return Ok(Inbound::Other {
            opcode,
            payload: element,
        });
    }

    serde_json::from_value::<ServerMessage>(element)
        .map(Inbound::Message)
        .map_err(|e| SessionError::ProtocolViolation(format!("bad `{opcode}` message: {e}")))
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::protocol::{AuthorRef, ParticipantInfo};

    #[test]
    fn single_command_is_wrapped_in_array() {
        let json = encode(&ClientMessage::Chat {
            message: "hi".into(),
        })
        .unwrap();
        assert_eq!(json, r#"[{"m":"a","message":"hi"}]"#);
    }

    #[test]
    fn batch_decodes_in_order() {
        let frame = r#"[
            {"m":"ch","ch":{"_id":"lobby"},"ppl":[{"_id":"a","name":"Alice"}]},
            {"m":"a","a":"hi","p":{"_id":"a","name":"Alice"}},
            {"m":"n","t":5,"n":[{"n":"a1"}],"p":"a"}
        ]"#;
        let decoded = decode_frame(frame).unwrap();
        assert_eq!(decoded.len(), 3);

        assert_eq!(decoded[0].as_ref().unwrap().opcode(), "ch");
        assert_eq!(
            decoded[1].as_ref().unwrap(),
            &Inbound::Message(ServerMessage::Chat {
                text: "hi".into(),
                author: AuthorRef {
                    id: "a".into(),
                    name: Some("Alice".into()),
                },
            })
        );
        match decoded[2].as_ref().unwrap() {
            Inbound::Other { opcode, payload } => {
                assert_eq!(opcode, "n");
                assert_eq!(payload["p"], "a");
            }
            other => panic!("expected forwarded opcode, got {other:?}"),
        }
    }

    #[test]
    fn malformed_element_does_not_poison_frame() {
        let frame = r#"[{"m":"bye"},{"nope":1},{"m":"p","_id":"b","name":"Bob"}]"#;
        let decoded = decode_frame(frame).unwrap();
        assert!(matches!(decoded[0], Err(SessionError::ProtocolViolation(_))));
        assert!(matches!(decoded[1], Err(SessionError::ProtocolViolation(_))));
        assert_eq!(
            decoded[2].as_ref().unwrap(),
            &Inbound::Message(ServerMessage::ParticipantJoin(ParticipantInfo {
                id: "b".into(),
                name: "Bob".into(),
                tag: None,
            }))
        );
    }

    #[test]
    fn non_array_frame_is_rejected() {
        assert!(matches!(
            decode_frame(r#"{"m":"t","t":1}"#),
            Err(SessionError::ProtocolViolation(_))
        ));
        assert!(matches!(
            decode_frame("not json"),
            Err(SessionError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn array_of_non_objects_is_dropped_whole() {
        for frame in [r#"[1,2]"#, r#"[{"m":"bye","p":"a"},"stray"]"#, "[null]"] {
            assert!(
                matches!(decode_frame(frame), Err(SessionError::ProtocolViolation(_))),
                "{frame}"
            );
        }
        assert!(decode_frame("[]").unwrap().is_empty());
    }

    #[test]
    fn time_sync_accepts_integer_clock() {
        let decoded = decode_frame(r#"[{"m":"t","t":1700000000000,"e":1699999999900}]"#).unwrap();
        assert_eq!(
            decoded[0].as_ref().unwrap(),
            &Inbound::Message(ServerMessage::TimeSync {
                server_time: 1_700_000_000_000.0,
                echoed_time: Some(1_699_999_999_900.0),
            })
        );
    }
}
