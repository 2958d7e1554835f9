use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::GatewayError;
use crate::events::Role;
use crate::ids::NudgeId;

/// One turn of conversation handed to a completion provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Reply returned by a completion provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Completion {
    pub content: String,
    pub tokens_used: u64,
    pub model: String,
}

/// Chat completion backend (OpenAI-compatible endpoint in production).
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, turns: &[ChatTurn]) -> Result<Completion, GatewayError>;
}

/// A prompt suggestion surfaced to the user as a message or a card.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nudge {
    pub id: NudgeId,
    pub text: String,
    pub category: String,
}

#[derive(Clone, Debug, thiserror::Error)]
#[error("nudge source unavailable: {0}")]
pub struct NudgeSourceError(pub String);

/// Source of nudges. Selection policy belongs to the implementation.
#[async_trait]
pub trait NudgeProvider: Send + Sync {
    /// Pick a nudge, or `None` when the catalogue is empty.
    async fn next_nudge(&self) -> Result<Option<Nudge>, NudgeSourceError>;
}
