//! The session aggregate.
//!
//! A [`Session`] is an immutable value: [`Session::apply`] consumes it
//! together with one [`SessionEvent`] and yields the next value, with all
//! rollups recomputed from the full event sequences. Persistence lives
//! elsewhere; nothing in this module performs I/O.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::events::{CardAction, FeedbackType, Role, SessionEvent, SpinAction};
use crate::ids::{NudgeId, SessionId};
use crate::rollups::SessionRollups;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub is_nudge: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nudge_ref: Option<NudgeId>,
    #[serde(default)]
    pub feedback: Option<FeedbackType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    pub tokens_used: u64,
    pub model: String,
}

/// A regenerate/new-nudge action. The message content is copied at the time
/// of the action, so later changes to the log never rewrite it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpinInteraction {
    pub message_index: usize,
    pub message_content: String,
    pub is_nudge: bool,
    pub timestamp: DateTime<Utc>,
    pub action: SpinAction,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardInteraction {
    pub card_id: String,
    pub card_title: String,
    pub card_content: String,
    pub action: CardAction,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nudge_ref: Option<NudgeId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScratchpadSnapshot {
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Client details captured when the session is created.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
}

/// Full record of one tracked conversation.
///
/// Deserialization goes through [`SessionRecord`] and recomputes the
/// rollups, so stored counters are never trusted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "SessionRecord")]
pub struct Session {
    session_id: SessionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    owner_id: Option<String>,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    is_active: bool,
    metadata: SessionMetadata,
    messages: Vec<Message>,
    spin_interactions: Vec<SpinInteraction>,
    card_interactions: Vec<CardInteraction>,
    scratchpad_snapshots: Vec<ScratchpadSnapshot>,
    #[serde(flatten)]
    rollups: SessionRollups,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Stored shape of a session: everything except the derived rollups.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionRecord {
    session_id: SessionId,
    #[serde(default, alias = "userId")]
    owner_id: Option<String>,
    start_time: DateTime<Utc>,
    #[serde(default)]
    end_time: Option<DateTime<Utc>>,
    is_active: bool,
    #[serde(default)]
    metadata: SessionMetadata,
    #[serde(default)]
    messages: Vec<Message>,
    #[serde(default)]
    spin_interactions: Vec<SpinInteraction>,
    #[serde(default)]
    card_interactions: Vec<CardInteraction>,
    #[serde(default)]
    scratchpad_snapshots: Vec<ScratchpadSnapshot>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<SessionRecord> for Session {
    fn from(r: SessionRecord) -> Self {
        let rollups =
            SessionRollups::compute(&r.messages, &r.spin_interactions, &r.card_interactions);
        Self {
            session_id: r.session_id,
            owner_id: r.owner_id,
            start_time: r.start_time,
            end_time: r.end_time,
            is_active: r.is_active,
            metadata: r.metadata,
            messages: r.messages,
            spin_interactions: r.spin_interactions,
            card_interactions: r.card_interactions,
            scratchpad_snapshots: r.scratchpad_snapshots,
            rollups,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

/// Result of applying an event.
#[derive(Clone, Debug, PartialEq)]
pub enum Transition {
    /// The event changed the session; the new value must be persisted.
    Applied(Session),
    /// The event was a no-op (duplicate scratchpad text, repeated end).
    Unchanged(Session),
}

impl Transition {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }

    pub fn session(&self) -> &Session {
        match self {
            Self::Applied(s) | Self::Unchanged(s) => s,
        }
    }

    pub fn into_session(self) -> Session {
        match self {
            Self::Applied(s) | Self::Unchanged(s) => s,
        }
    }
}

/// Reduced read view: identity, timing and rollups.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub session_id: SessionId,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Milliseconds.
    pub duration: i64,
    #[serde(flatten)]
    pub rollups: SessionRollups,
    pub is_active: bool,
}

impl Session {
    /// Start a new active session with a fresh id.
    pub fn create(owner_id: Option<String>, metadata: SessionMetadata, now: DateTime<Utc>) -> Self {
        Self {
            session_id: SessionId::new(),
            owner_id,
            start_time: now,
            end_time: None,
            is_active: true,
            metadata,
            messages: Vec::new(),
            spin_interactions: Vec::new(),
            card_interactions: Vec::new(),
            scratchpad_snapshots: Vec::new(),
            rollups: SessionRollups::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply one event.
    ///
    /// Ended sessions reject every event except a repeated end, which is a
    /// no-op that keeps the original `end_time`.
    pub fn apply(mut self, event: SessionEvent, now: DateTime<Utc>) -> Result<Transition, DomainError> {
        if !self.is_active {
            return match event {
                SessionEvent::Ended => Ok(Transition::Unchanged(self)),
                _ => Err(DomainError::SessionEnded(self.session_id)),
            };
        }

        match event {
            SessionEvent::MessageAdded(m) => self.messages.push(Message {
                role: m.role,
                content: m.content,
                timestamp: now,
                is_nudge: m.is_nudge,
                nudge_ref: m.nudge_ref,
                feedback: None,
                response_time_ms: m.response_time_ms,
                tokens_used: m.tokens_used,
                model: m.model,
            }),
            SessionEvent::FeedbackSet {
                message_index,
                feedback,
            } => {
                let idx = self.message_slot(message_index)?;
                self.messages[idx].feedback = Some(feedback);
            }
            SessionEvent::SpinRecorded {
                message_index,
                action,
            } => {
                let idx = self.message_slot(message_index)?;
                let source = &self.messages[idx];
                let spin = SpinInteraction {
                    message_index: idx,
                    message_content: source.content.clone(),
                    is_nudge: source.is_nudge,
                    timestamp: now,
                    action,
                };
                self.spin_interactions.push(spin);
            }
            SessionEvent::CardRecorded(c) => self.card_interactions.push(CardInteraction {
                card_id: c.card_id,
                card_title: c.card_title,
                card_content: c.card_content,
                action: c.action,
                timestamp: now,
                nudge_ref: c.nudge_ref,
            }),
            SessionEvent::ScratchpadCaptured { text } => {
                if self.scratchpad_snapshots.last().is_some_and(|s| s.text == text) {
                    return Ok(Transition::Unchanged(self));
                }
                self.scratchpad_snapshots.push(ScratchpadSnapshot {
                    text,
                    timestamp: now,
                });
            }
            SessionEvent::Ended => {
                self.end_time = Some(now);
                self.is_active = false;
            }
        }

        self.updated_at = now;
        self.rollups = SessionRollups::compute(
            &self.messages,
            &self.spin_interactions,
            &self.card_interactions,
        );
        Ok(Transition::Applied(self))
    }

    fn message_slot(&self, index: i64) -> Result<usize, DomainError> {
        usize::try_from(index)
            .ok()
            .filter(|&i| i < self.messages.len())
            .ok_or(DomainError::MessageIndexOutOfRange {
                index,
                len: self.messages.len(),
            })
    }

    /// `end_time - start_time` once ended, else `now - start_time`.
    pub fn duration_ms(&self, now: DateTime<Utc>) -> i64 {
        let end = self.end_time.unwrap_or(now);
        (end - self.start_time).num_milliseconds().max(0)
    }

    pub fn stats(&self, now: DateTime<Utc>) -> SessionStats {
        SessionStats {
            session_id: self.session_id.clone(),
            start_time: self.start_time,
            end_time: self.end_time,
            duration: self.duration_ms(now),
            rollups: self.rollups.clone(),
            is_active: self.is_active,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn owner_id(&self) -> Option<&str> {
        self.owner_id.as_deref()
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn metadata(&self) -> &SessionMetadata {
        &self.metadata
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn spin_interactions(&self) -> &[SpinInteraction] {
        &self.spin_interactions
    }

    pub fn card_interactions(&self) -> &[CardInteraction] {
        &self.card_interactions
    }

    pub fn scratchpad_snapshots(&self) -> &[ScratchpadSnapshot] {
        &self.scratchpad_snapshots
    }

    pub fn rollups(&self) -> &SessionRollups {
        &self.rollups
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{NewCardInteraction, NewMessage};
    use chrono::Duration;
    use proptest::prelude::*;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn fresh() -> Session {
        Session::create(Some("owner-1".into()), SessionMetadata::default(), t0())
    }

    fn applied(s: Session, e: SessionEvent) -> Session {
        match s.apply(e, t0() + Duration::seconds(1)).unwrap() {
            Transition::Applied(s) => s,
            Transition::Unchanged(_) => panic!("expected the event to apply"),
        }
    }

    fn card(id: &str, action: CardAction) -> SessionEvent {
        SessionEvent::CardRecorded(NewCardInteraction {
            card_id: id.into(),
            card_title: "title".into(),
            card_content: "content".into(),
            action,
            nudge_ref: None,
        })
    }

    #[test]
    fn create_starts_active_and_empty() {
        let s = fresh();
        assert!(s.is_active());
        assert!(s.end_time().is_none());
        assert_eq!(s.start_time(), t0());
        assert!(s.messages().is_empty());
        assert_eq!(s.rollups(), &SessionRollups::default());
        assert!(s.session_id().as_str().starts_with("sess_"));
    }

    #[test]
    fn two_messages_then_stats() {
        let s = fresh();
        let s = applied(s, SessionEvent::MessageAdded(NewMessage::user("hi")));
        let s = applied(
            s,
            SessionEvent::MessageAdded(NewMessage::assistant("hello").with_response_time(120)),
        );
        let stats = s.stats(t0() + Duration::seconds(5));
        assert_eq!(stats.rollups.total_messages, 2);
        assert_eq!(stats.rollups.total_user_messages, 1);
        assert_eq!(stats.rollups.total_assistant_messages, 1);
        assert!((stats.rollups.average_response_time - 120.0).abs() < f64::EPSILON);
        assert_eq!(stats.duration, 5_000);
        assert!(stats.is_active);
    }

    #[test]
    fn feedback_out_of_range_is_rejected_without_change() {
        let s = applied(fresh(), SessionEvent::MessageAdded(NewMessage::user("hi")));
        let before = s.rollups().clone();
        let err = s
            .clone()
            .apply(
                SessionEvent::FeedbackSet {
                    message_index: 5,
                    feedback: FeedbackType::Positive,
                },
                t0(),
            )
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(s.rollups(), &before);

        let negative = s.apply(
            SessionEvent::FeedbackSet {
                message_index: -1,
                feedback: FeedbackType::Positive,
            },
            t0(),
        );
        assert!(matches!(
            negative,
            Err(DomainError::MessageIndexOutOfRange { index: -1, len: 1 })
        ));
    }

    #[test]
    fn feedback_replaces_previous_mark() {
        let s = applied(fresh(), SessionEvent::MessageAdded(NewMessage::assistant("a")));
        let s = applied(
            s,
            SessionEvent::FeedbackSet {
                message_index: 0,
                feedback: FeedbackType::Positive,
            },
        );
        let s = applied(
            s,
            SessionEvent::FeedbackSet {
                message_index: 0,
                feedback: FeedbackType::Negative,
            },
        );
        let fb = &s.rollups().feedback_stats;
        assert_eq!((fb.positive, fb.negative, fb.total), (0, 1, 1));
    }

    #[test]
    fn spin_snapshots_message_content() {
        let nudge_msg = NewMessage {
            is_nudge: true,
            ..NewMessage::assistant("try a different angle")
        };
        let s = applied(fresh(), SessionEvent::MessageAdded(nudge_msg));
        let s = applied(
            s,
            SessionEvent::SpinRecorded {
                message_index: 0,
                action: SpinAction::NewNudge,
            },
        );
        let spin = &s.spin_interactions()[0];
        assert_eq!(spin.message_content, "try a different angle");
        assert!(spin.is_nudge);
        assert_eq!(spin.message_index, 0);
        assert_eq!(s.rollups().spin_stats.new_nudges, 1);
        assert_eq!(s.rollups().total_spin_interactions, 1);
    }

    #[test]
    fn spin_on_missing_message_is_not_found() {
        let err = fresh()
            .apply(
                SessionEvent::SpinRecorded {
                    message_index: 0,
                    action: SpinAction::Regenerate,
                },
                t0(),
            )
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn card_breakdown_by_action() {
        let s = applied(fresh(), card("c1", CardAction::Accept));
        let s = applied(s, card("c2", CardAction::Dismiss));
        let cs = &s.rollups().card_stats;
        assert_eq!(cs.total, 2);
        assert_eq!(cs.accepted, 1);
        assert_eq!(cs.dismissed, 1);
        assert_eq!(cs.neutral, 0);
        assert_eq!(s.rollups().total_card_interactions, 2);
    }

    #[test]
    fn duplicate_scratchpad_is_skipped() {
        let text = || SessionEvent::ScratchpadCaptured { text: "draft".into() };
        let s = applied(fresh(), text());
        let t = s.apply(text(), t0()).unwrap();
        assert!(!t.is_applied());
        assert_eq!(t.session().scratchpad_snapshots().len(), 1);

        let s = applied(t.into_session(), SessionEvent::ScratchpadCaptured { text: "other".into() });
        let s = applied(s, text());
        assert_eq!(s.scratchpad_snapshots().len(), 3);
    }

    #[test]
    fn end_sets_end_time_and_freezes_duration() {
        let s = fresh();
        let end = t0() + Duration::minutes(3);
        let s = s.apply(SessionEvent::Ended, end).unwrap().into_session();
        assert!(!s.is_active());
        assert_eq!(s.end_time(), Some(end));
        assert_eq!(s.duration_ms(end + Duration::hours(1)), 180_000);
    }

    #[test]
    fn second_end_keeps_first_end_time() {
        let end = t0() + Duration::minutes(1);
        let s = fresh().apply(SessionEvent::Ended, end).unwrap().into_session();
        let again = s.apply(SessionEvent::Ended, end + Duration::minutes(5)).unwrap();
        assert!(!again.is_applied());
        assert_eq!(again.session().end_time(), Some(end));
    }

    #[test]
    fn ended_session_rejects_mutations() {
        let s = fresh().apply(SessionEvent::Ended, t0()).unwrap().into_session();
        let err = s
            .apply(SessionEvent::MessageAdded(NewMessage::user("late")), t0())
            .unwrap_err();
        assert!(matches!(err, DomainError::SessionEnded(_)));
    }

    #[test]
    fn stored_rollups_are_recomputed_on_load() {
        let s = applied(fresh(), SessionEvent::MessageAdded(NewMessage::user("hi")));
        let mut json = serde_json::to_value(&s).unwrap();
        json["totalMessages"] = serde_json::json!(42);
        let loaded: Session = serde_json::from_value(json).unwrap();
        assert_eq!(loaded.rollups().total_messages, 1);
        assert_eq!(loaded, s);
    }

    #[test]
    fn legacy_user_id_is_read_as_owner() {
        let s = fresh();
        let mut json = serde_json::to_value(&s).unwrap();
        let obj = json.as_object_mut().unwrap();
        obj.remove("ownerId");
        obj.insert("userId".into(), serde_json::json!("legacy-user"));
        let loaded: Session = serde_json::from_value(json).unwrap();
        assert_eq!(loaded.owner_id(), Some("legacy-user"));
    }

    // Strategy for arbitrary event streams, including invalid indices.
    fn event_strategy() -> impl Strategy<Value = SessionEvent> {
        let role = prop_oneof![Just(Role::User), Just(Role::Assistant)];
        let message = (role, any::<bool>(), proptest::option::of(0u64..5_000), 0u64..2_000)
            .prop_map(|(role, is_nudge, rt, tokens)| {
                let mut m = NewMessage::new(role, "m").with_tokens(tokens);
                m.is_nudge = is_nudge;
                m.response_time_ms = rt;
                SessionEvent::MessageAdded(m)
            });
        let feedback = (-1i64..8, any::<bool>()).prop_map(|(i, pos)| SessionEvent::FeedbackSet {
            message_index: i,
            feedback: if pos { FeedbackType::Positive } else { FeedbackType::Negative },
        });
        let spin = (-1i64..8, any::<bool>()).prop_map(|(i, regen)| SessionEvent::SpinRecorded {
            message_index: i,
            action: if regen { SpinAction::Regenerate } else { SpinAction::NewNudge },
        });
        let card = (0u8..3).prop_map(|a| {
            let action = match a {
                0 => CardAction::Accept,
                1 => CardAction::Dismiss,
                _ => CardAction::Neutral,
            };
            card("c", action)
        });
        let scratch = prop_oneof![Just("a"), Just("b")]
            .prop_map(|t| SessionEvent::ScratchpadCaptured { text: t.to_owned() });
        prop_oneof![8 => message, 3 => feedback, 3 => spin, 3 => card, 3 => scratch]
    }

    proptest! {
        #[test]
        fn rollups_always_match_a_fresh_scan(events in proptest::collection::vec(event_strategy(), 0..60)) {
            let mut s = fresh();
            for e in events {
                // Rejected events must leave the previous value untouched.
                if let Ok(t) = s.clone().apply(e, t0()) {
                    s = t.into_session();
                }
            }

            let msgs = s.messages();
            let r = s.rollups();
            prop_assert_eq!(r.total_messages, msgs.len());
            prop_assert_eq!(r.total_user_messages, msgs.iter().filter(|m| m.role == Role::User).count());
            prop_assert_eq!(r.total_assistant_messages, msgs.iter().filter(|m| m.role == Role::Assistant).count());
            prop_assert_eq!(r.total_nudges, msgs.iter().filter(|m| m.is_nudge).count());
            prop_assert_eq!(r.total_tokens, msgs.iter().map(|m| m.tokens_used).sum::<u64>());
            prop_assert_eq!(r.feedback_stats.total, msgs.iter().filter(|m| m.feedback.is_some()).count());
            prop_assert_eq!(r.feedback_stats.positive + r.feedback_stats.negative, r.feedback_stats.total);
            prop_assert_eq!(r.spin_stats.total, s.spin_interactions().len());
            prop_assert_eq!(r.spin_stats.regenerations + r.spin_stats.new_nudges, r.spin_stats.total);
            prop_assert_eq!(r.card_stats.total, s.card_interactions().len());
            prop_assert_eq!(
                r.card_stats.accepted + r.card_stats.dismissed + r.card_stats.neutral,
                r.card_stats.total
            );

            let timed: Vec<u64> = msgs
                .iter()
                .filter(|m| m.role == Role::Assistant)
                .filter_map(|m| m.response_time_ms)
                .collect();
            let expected_avg = if timed.is_empty() {
                0.0
            } else {
                timed.iter().sum::<u64>() as f64 / timed.len() as f64
            };
            prop_assert!((r.average_response_time - expected_avg).abs() < 1e-9);

            for pair in s.scratchpad_snapshots().windows(2) {
                prop_assert_ne!(&pair[0].text, &pair[1].text);
            }
        }
    }
}
