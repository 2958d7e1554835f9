//! Validated events accepted by the session aggregate.
//!
//! Every enum here parses from the wire vocabulary via `FromStr` and
//! reports a [`DomainError::InvalidValue`] for anything outside it, so the
//! aggregate itself only ever sees well-formed input.

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::ids::NudgeId;
use crate::provider::Nudge;

/// Model recorded on messages that do not name one.
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = DomainError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(invalid("role", other, "user, assistant")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackType {
    Positive,
    Negative,
}

impl std::fmt::Display for FeedbackType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Positive => write!(f, "positive"),
            Self::Negative => write!(f, "negative"),
        }
    }
}

impl std::str::FromStr for FeedbackType {
    type Err = DomainError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "positive" => Ok(Self::Positive),
            "negative" => Ok(Self::Negative),
            other => Err(invalid("feedbackType", other, "positive, negative")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpinAction {
    Regenerate,
    NewNudge,
}

impl std::fmt::Display for SpinAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Regenerate => write!(f, "regenerate"),
            Self::NewNudge => write!(f, "new_nudge"),
        }
    }
}

impl std::str::FromStr for SpinAction {
    type Err = DomainError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "regenerate" => Ok(Self::Regenerate),
            "new_nudge" => Ok(Self::NewNudge),
            other => Err(invalid("action", other, "regenerate, new_nudge")),
        }
    }
}

/// Outcome of a card interaction.
///
/// Older clients sent `like`/`dislike`; those parse as `Accept`/`Dismiss`.
/// Serialization always emits the canonical names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CardAction {
    #[serde(rename = "accept", alias = "like")]
    Accept,
    #[serde(rename = "dismiss", alias = "dislike")]
    Dismiss,
    #[serde(rename = "neutral")]
    Neutral,
}

impl std::fmt::Display for CardAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Accept => write!(f, "accept"),
            Self::Dismiss => write!(f, "dismiss"),
            Self::Neutral => write!(f, "neutral"),
        }
    }
}

impl std::str::FromStr for CardAction {
    type Err = DomainError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accept" | "like" => Ok(Self::Accept),
            "dismiss" | "dislike" => Ok(Self::Dismiss),
            "neutral" => Ok(Self::Neutral),
            other => Err(invalid("action", other, "accept, dismiss, neutral")),
        }
    }
}

fn invalid(field: &'static str, value: &str, expected: &'static str) -> DomainError {
    DomainError::InvalidValue {
        field,
        value: value.to_owned(),
        expected,
    }
}

/// A chat message about to be appended to a session.
#[derive(Clone, Debug, PartialEq)]
pub struct NewMessage {
    pub role: Role,
    pub content: String,
    pub is_nudge: bool,
    pub nudge_ref: Option<NudgeId>,
    pub response_time_ms: Option<u64>,
    pub tokens_used: u64,
    pub model: String,
}

impl NewMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            is_nudge: false,
            nudge_ref: None,
            response_time_ms: None,
            tokens_used: 0,
            model: DEFAULT_MODEL.to_owned(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Assistant-side message surfacing a nudge prompt.
    pub fn from_nudge(nudge: &Nudge) -> Self {
        Self {
            is_nudge: true,
            nudge_ref: Some(nudge.id.clone()),
            ..Self::assistant(nudge.text.clone())
        }
    }

    pub fn with_response_time(mut self, ms: u64) -> Self {
        self.response_time_ms = Some(ms);
        self
    }

    pub fn with_tokens(mut self, tokens: u64) -> Self {
        self.tokens_used = tokens;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

/// A card interaction about to be logged.
#[derive(Clone, Debug, PartialEq)]
pub struct NewCardInteraction {
    pub card_id: String,
    pub card_title: String,
    pub card_content: String,
    pub action: CardAction,
    pub nudge_ref: Option<NudgeId>,
}

/// One mutation of a session.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    MessageAdded(NewMessage),
    FeedbackSet { message_index: i64, feedback: FeedbackType },
    SpinRecorded { message_index: i64, action: SpinAction },
    CardRecorded(NewCardInteraction),
    ScratchpadCaptured { text: String },
    Ended,
}

impl SessionEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MessageAdded(_) => "message_added",
            Self::FeedbackSet { .. } => "feedback_set",
            Self::SpinRecorded { .. } => "spin_recorded",
            Self::CardRecorded(_) => "card_recorded",
            Self::ScratchpadCaptured { .. } => "scratchpad_captured",
            Self::Ended => "ended",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parses_wire_names() {
        assert_eq!("user".parse::<Role>().unwrap(), Role::User);
        assert_eq!("assistant".parse::<Role>().unwrap(), Role::Assistant);
        assert!(matches!(
            "system".parse::<Role>(),
            Err(DomainError::InvalidValue { field: "role", .. })
        ));
    }

    #[test]
    fn spin_action_uses_snake_case() {
        assert_eq!("new_nudge".parse::<SpinAction>().unwrap(), SpinAction::NewNudge);
        assert_eq!(SpinAction::NewNudge.to_string(), "new_nudge");
        assert_eq!(serde_json::to_string(&SpinAction::NewNudge).unwrap(), "\"new_nudge\"");
        assert!("newNudge".parse::<SpinAction>().is_err());
    }

    #[test]
    fn card_action_accepts_legacy_vocabulary() {
        assert_eq!("like".parse::<CardAction>().unwrap(), CardAction::Accept);
        assert_eq!("dislike".parse::<CardAction>().unwrap(), CardAction::Dismiss);
        assert_eq!("neutral".parse::<CardAction>().unwrap(), CardAction::Neutral);

        let legacy: CardAction = serde_json::from_str("\"like\"").unwrap();
        assert_eq!(legacy, CardAction::Accept);
        assert_eq!(serde_json::to_string(&legacy).unwrap(), "\"accept\"");
    }

    #[test]
    fn card_action_rejects_unknown() {
        let err = "love".parse::<CardAction>().unwrap_err();
        assert!(err.to_string().contains("accept, dismiss, neutral"));
    }

    #[test]
    fn feedback_type_round_trips_through_display() {
        for fb in [FeedbackType::Positive, FeedbackType::Negative] {
            assert_eq!(fb.to_string().parse::<FeedbackType>().unwrap(), fb);
        }
    }

    #[test]
    fn new_message_defaults() {
        let msg = NewMessage::user("hi");
        assert_eq!(msg.role, Role::User);
        assert!(!msg.is_nudge);
        assert_eq!(msg.tokens_used, 0);
        assert_eq!(msg.model, DEFAULT_MODEL);
        assert!(msg.response_time_ms.is_none());
    }

    #[test]
    fn nudge_builds_message() {
        let nudge = Nudge {
            id: NudgeId::from_raw("ndg_1"),
            text: "What would a skeptic say?".into(),
            category: "Critical thinking".into(),
        };

        let msg = NewMessage::from_nudge(&nudge);
        assert!(msg.is_nudge);
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.nudge_ref.as_ref().map(NudgeId::as_str), Some("ndg_1"));
        assert_eq!(msg.content, "What would a skeptic say?");
    }
}
