//! Room membership.
//!
//! The roster maps participant ids to their latest known metadata. It is
//! only mutated by the dispatcher in response to server messages, and every
//! mutation reports the event consumers should see.

use std::collections::HashMap;

use crate::event::{Author, Participant, SessionEvent};
use crate::protocol::{AuthorRef, ParticipantInfo};

/// Live view of who is in the current room.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    participants: HashMap<String, Participant>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Participant> {
        self.participants.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.participants.contains_key(id)
    }

    /// All participants, sorted by id for stable output.
    pub fn participants(&self) -> Vec<Participant> {
        let mut all: Vec<_> = self.participants.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Apply a room snapshot.
    ///
    /// Snapshots are additive: every listed participant is inserted or
    /// replaced, and participants missing from the snapshot stay. Returns the
    /// participants as applied, in snapshot order.
    pub fn apply_snapshot(&mut self, people: Vec<ParticipantInfo>) -> Vec<Participant> {
        people
            .into_iter()
            .map(|info| {
                let participant = Participant::from(info);
                self.participants
                    .insert(participant.id.clone(), participant.clone());
                participant
            })
            .collect()
    }

    /// Apply a join. A repeated join for a known id is an update.
    pub fn join(&mut self, info: ParticipantInfo) -> SessionEvent {
        let participant = Participant::from(info);
        match self
            .participants
            .insert(participant.id.clone(), participant.clone())
        {
            Some(_) => SessionEvent::ParticipantUpdated(participant),
            None => SessionEvent::ParticipantAdded(participant),
        }
    }

    /// Apply a leave. Unknown ids are reported with placeholder metadata.
    pub fn leave(&mut self, id: &str) -> SessionEvent {
        let participant = self
            .participants
            .remove(id)
            .unwrap_or_else(|| Participant::unknown(id));
        SessionEvent::ParticipantRemoved(participant)
    }

    /// Resolve a chat author against the roster.
    pub fn resolve_author(&self, author: AuthorRef) -> Author {
        match self.participants.get(&author.id) {
            Some(p) => Author::Known(p.clone()),
            None => Author::Unknown {
                id: author.id,
                name: author.name,
            },
        }
    }

    /// Forget everyone. Used when a new server session starts.
    pub fn clear(&mut self) {
        self.participants.clear();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    fn info(id: &str, name: &str, tag: Option<&str>) -> ParticipantInfo {
        ParticipantInfo {
            id: id.into(),
            name: name.into(),
            tag: tag.map(Into::into),
        }
    }

    #[test]
    fn snapshot_then_chat_resolves_author() {
        let mut roster = Roster::new();
        roster.apply_snapshot(vec![info("a", "Alice", None)]);

        let author = roster.resolve_author(AuthorRef {
            id: "a".into(),
            name: None,
        });
        assert_eq!(
            author,
            Author::Known(Participant {
                id: "a".into(),
                name: "Alice".into(),
                role: "user".into(),
            })
        );
    }

    #[test]
    fn unknown_author_is_marked() {
        let roster = Roster::new();
        let author = roster.resolve_author(AuthorRef {
            id: "ghost".into(),
            name: Some("Casper".into()),
        });
        assert_eq!(
            author,
            Author::Unknown {
                id: "ghost".into(),
                name: Some("Casper".into()),
            }
        );
    }

    #[test]
    fn snapshot_is_additive_and_idempotent() {
        let mut roster = Roster::new();
        roster.apply_snapshot(vec![info("a", "Alice", None), info("b", "Bob", None)]);
        roster.apply_snapshot(vec![info("a", "Alicia", Some("admin"))]);
        assert_eq!(roster.len(), 2);
        assert_eq!(roster.get("a").unwrap().name, "Alicia");
        assert_eq!(roster.get("a").unwrap().role, "admin");
        assert!(roster.contains("b"));

        let before = roster.participants();
        roster.apply_snapshot(vec![info("a", "Alicia", Some("admin"))]);
        assert_eq!(roster.participants(), before);
    }

    #[test]
    fn join_twice_is_an_update() {
        let mut roster = Roster::new();
        assert!(matches!(
            roster.join(info("a", "Alice", None)),
            SessionEvent::ParticipantAdded(_)
        ));
        match roster.join(info("a", "Al", Some("bot"))) {
            SessionEvent::ParticipantUpdated(p) => {
                assert_eq!(p.id, "a");
                assert_eq!(p.name, "Al");
                assert_eq!(p.role, "bot");
            }
            other => panic!("expected update, got {other:?}"),
        }
        assert_eq!(roster.len(), 1);
    }

    #[test]
    fn leave_reports_last_known_metadata() {
        let mut roster = Roster::new();
        roster.join(info("a", "Alice", Some("mod")));
        match roster.leave("a") {
            SessionEvent::ParticipantRemoved(p) => {
                assert_eq!(p.name, "Alice");
                assert_eq!(p.role, "mod");
            }
            other => panic!("expected removal, got {other:?}"),
        }
        assert!(roster.is_empty());
    }

    #[test]
    fn leave_of_unknown_id_is_harmless() {
        let mut roster = Roster::new();
        assert_eq!(
            roster.leave("a"),
            SessionEvent::ParticipantRemoved(Participant::unknown("a"))
        );
        assert_eq!(roster.len(), 0);
    }

    #[test]
    fn join_leave_sequence_tracks_membership() {
        let mut roster = Roster::new();
        roster.join(info("a", "Alice", None));
        roster.join(info("b", "Bob", None));
        roster.leave("a");
        roster.join(info("c", "Cid", None));
        roster.join(info("b", "Robert", None));
        roster.leave("zzz");
        roster.join(info("a", "Alice", None));
        roster.leave("c");

        let ids: Vec<_> = roster.participants().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(roster.get("b").unwrap().name, "Robert");
    }
}
