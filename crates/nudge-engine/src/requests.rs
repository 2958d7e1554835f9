//! Request payloads as received over the wire, and their validation into
//! domain events.
//!
//! Fields are deliberately loose (`Option<String>`, signed integers) so that
//! a missing or out-of-vocabulary value surfaces as a `Validation` error
//! naming the field rather than a generic decode failure.

use serde::Deserialize;

use nudge_core::{
    CardAction, DomainError, FeedbackType, NewCardInteraction, NewMessage, NudgeId, Role,
    SessionMetadata, SpinAction,
};

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    #[serde(default, alias = "userId")]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub metadata: Option<SessionMetadata>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMessageRequest {
    pub role: Option<String>,
    pub content: Option<String>,
    #[serde(default)]
    pub is_nudge: Option<bool>,
    #[serde(default, alias = "nudgeId")]
    pub nudge_ref: Option<String>,
    #[serde(default, alias = "responseTime")]
    pub response_time_ms: Option<i64>,
    #[serde(default)]
    pub tokens_used: Option<i64>,
    #[serde(default)]
    pub model: Option<String>,
}

impl AddMessageRequest {
    pub fn into_message(self) -> Result<NewMessage, DomainError> {
        let role: Role = required("role", self.role)?.parse()?;
        let content = required("content", self.content)?;
        let mut message = NewMessage::new(role, content);
        message.is_nudge = self.is_nudge.unwrap_or(false);
        message.nudge_ref = non_blank(self.nudge_ref).map(NudgeId::from_raw);
        message.response_time_ms = self
            .response_time_ms
            .map(|v| non_negative("responseTimeMs", v))
            .transpose()?;
        if let Some(tokens) = self.tokens_used {
            message.tokens_used = non_negative("tokensUsed", tokens)?;
        }
        if let Some(model) = non_blank(self.model) {
            message.model = model;
        }
        Ok(message)
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRequest {
    pub feedback_type: Option<String>,
}

impl FeedbackRequest {
    pub fn into_feedback(self) -> Result<FeedbackType, DomainError> {
        required("feedbackType", self.feedback_type)?.parse()
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SpinRequest {
    pub action: Option<String>,
}

impl SpinRequest {
    pub fn into_action(self) -> Result<SpinAction, DomainError> {
        required("action", self.action)?.parse()
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardRequest {
    pub card_id: Option<String>,
    pub card_title: Option<String>,
    pub card_content: Option<String>,
    pub action: Option<String>,
    #[serde(default, alias = "nudgeId")]
    pub nudge_ref: Option<String>,
}

impl CardRequest {
    pub fn into_interaction(self) -> Result<NewCardInteraction, DomainError> {
        Ok(NewCardInteraction {
            card_id: required("cardId", self.card_id)?,
            card_title: required("cardTitle", self.card_title)?,
            card_content: required("cardContent", self.card_content)?,
            action: required("action", self.action)?.parse::<CardAction>()?,
            nudge_ref: non_blank(self.nudge_ref).map(NudgeId::from_raw),
        })
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ScratchpadRequest {
    pub text: Option<String>,
}

impl ScratchpadRequest {
    /// Empty text is a valid snapshot (the user cleared the pad).
    pub fn into_text(self) -> Result<String, DomainError> {
        self.text.ok_or(DomainError::MissingField("text"))
    }
}

/// Parse a path segment as a message index. Negative values parse and are
/// rejected later as out of range.
pub fn parse_index(raw: &str) -> Result<i64, DomainError> {
    raw.trim().parse().map_err(|_| DomainError::InvalidValue {
        field: "index",
        value: raw.to_owned(),
        expected: "an integer",
    })
}

fn required(field: &'static str, value: Option<String>) -> Result<String, DomainError> {
    non_blank(value).ok_or(DomainError::MissingField(field))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn non_negative(field: &'static str, value: i64) -> Result<u64, DomainError> {
    u64::try_from(value).map_err(|_| DomainError::Negative { field, value })
}
