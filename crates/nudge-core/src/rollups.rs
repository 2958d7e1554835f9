use serde::{Deserialize, Serialize};

use crate::events::{CardAction, FeedbackType, Role, SpinAction};
use crate::session::{CardInteraction, Message, SpinInteraction};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackStats {
    pub positive: usize,
    pub negative: usize,
    pub total: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpinStats {
    pub regenerations: usize,
    pub new_nudges: usize,
    pub total: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardStats {
    pub accepted: usize,
    pub dismissed: usize,
    pub neutral: usize,
    pub total: usize,
}

/// Statistics derived from a session's event sequences.
///
/// Always produced by [`SessionRollups::compute`]; there is no way to
/// adjust a single counter in place.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRollups {
    pub total_messages: usize,
    pub total_user_messages: usize,
    pub total_assistant_messages: usize,
    pub total_nudges: usize,
    pub total_tokens: u64,
    /// Mean over assistant messages that carry a response time, in ms. 0 when none do.
    pub average_response_time: f64,
    pub total_spin_interactions: usize,
    pub total_card_interactions: usize,
    pub feedback_stats: FeedbackStats,
    pub spin_stats: SpinStats,
    pub card_stats: CardStats,
}

impl SessionRollups {
    pub fn compute(
        messages: &[Message],
        spins: &[SpinInteraction],
        cards: &[CardInteraction],
    ) -> Self {
        let mut r = Self {
            total_messages: messages.len(),
            total_spin_interactions: spins.len(),
            total_card_interactions: cards.len(),
            ..Self::default()
        };

        let mut timed = 0u64;
        let mut timed_sum = 0u64;
        for m in messages {
            match m.role {
                Role::User => r.total_user_messages += 1,
                Role::Assistant => {
                    r.total_assistant_messages += 1;
                    if let Some(ms) = m.response_time_ms {
                        timed += 1;
                        timed_sum = timed_sum.saturating_add(ms);
                    }
                }
            }
            if m.is_nudge {
                r.total_nudges += 1;
            }
            r.total_tokens = r.total_tokens.saturating_add(m.tokens_used);
            match m.feedback {
                Some(FeedbackType::Positive) => r.feedback_stats.positive += 1,
                Some(FeedbackType::Negative) => r.feedback_stats.negative += 1,
                None => {}
            }
        }
        r.feedback_stats.total = r.feedback_stats.positive + r.feedback_stats.negative;
        if timed > 0 {
            r.average_response_time = timed_sum as f64 / timed as f64;
        }

        r.spin_stats.total = spins.len();
        for s in spins {
            match s.action {
                SpinAction::Regenerate => r.spin_stats.regenerations += 1,
                SpinAction::NewNudge => r.spin_stats.new_nudges += 1,
            }
        }

        r.card_stats.total = cards.len();
        for c in cards {
            match c.action {
                CardAction::Accept => r.card_stats.accepted += 1,
                CardAction::Dismiss => r.card_stats.dismissed += 1,
                CardAction::Neutral => r.card_stats.neutral += 1,
            }
        }

        r
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn msg(role: Role, rt: Option<u64>, tokens: u64) -> Message {
        Message {
            role,
            content: "x".into(),
            timestamp: Utc::now(),
            is_nudge: false,
            nudge_ref: None,
            feedback: None,
            response_time_ms: rt,
            tokens_used: tokens,
            model: "m".into(),
        }
    }

    #[test]
    fn empty_history_is_all_zero() {
        assert_eq!(SessionRollups::compute(&[], &[], &[]), SessionRollups::default());
    }

    #[test]
    fn average_ignores_untimed_and_user_messages() {
        let messages = vec![
            msg(Role::User, Some(999), 3),
            msg(Role::Assistant, Some(100), 10),
            msg(Role::Assistant, None, 5),
            msg(Role::Assistant, Some(300), 7),
        ];
        let r = SessionRollups::compute(&messages, &[], &[]);
        assert_eq!(r.total_messages, 4);
        assert_eq!(r.total_user_messages, 1);
        assert_eq!(r.total_assistant_messages, 3);
        assert_eq!(r.total_tokens, 25);
        assert!((r.average_response_time - 200.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rollups_serialize_with_wire_names() {
        let json = serde_json::to_value(SessionRollups::default()).unwrap();
        assert!(json.get("totalUserMessages").is_some());
        assert!(json.get("averageResponseTime").is_some());
        assert!(json["spinStats"].get("newNudges").is_some());
        assert!(json["cardStats"].get("dismissed").is_some());
    }
}
