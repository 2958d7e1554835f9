use std::time::Duration;

use nudge_core::{DomainError, GatewayError, NudgeSourceError, SessionId};
use nudge_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(StoreError),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("session {0} has ended")]
    SessionEnded(SessionId),

    #[error("session {session_id} is busy (waited {waited:?})")]
    Busy { session_id: SessionId, waited: Duration },

    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    NudgeSource(#[from] NudgeSourceError),
}

impl EngineError {
    /// Short classification string for logs and response bodies.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Validation(_) => "validation",
            Self::Storage(_) => "storage",
            Self::Conflict(_) => "conflict",
            Self::SessionEnded(_) => "session_ended",
            Self::Busy { .. } => "busy",
            Self::Gateway(_) => "gateway",
            Self::NudgeSource(_) => "nudge_source",
        }
    }

    /// Caller mistakes, as opposed to infrastructure failures.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::Validation(_) | Self::SessionEnded(_)
        )
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => Self::NotFound(format!("{what} not found")),
            StoreError::Conflict(detail) | StoreError::Duplicate(detail) => Self::Conflict(detail),
            other => Self::Storage(other),
        }
    }
}

impl From<DomainError> for EngineError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::SessionEnded(id) => Self::SessionEnded(id),
            DomainError::MessageIndexOutOfRange { .. } => Self::NotFound(e.to_string()),
            DomainError::InvalidValue { .. }
            | DomainError::MissingField(_)
            | DomainError::Negative { .. } => Self::Validation(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_keep_their_class() {
        let e: EngineError = StoreError::NotFound("session sess_x".into()).into();
        assert!(matches!(e, EngineError::NotFound(ref m) if m == "session sess_x not found"));

        let e: EngineError = StoreError::Conflict("stale".into()).into();
        assert_eq!(e.error_kind(), "conflict");

        let e: EngineError = StoreError::Database("disk I/O error".into()).into();
        assert_eq!(e.error_kind(), "storage");
        assert!(!e.is_caller_error());
    }

    #[test]
    fn domain_errors_map_to_caller_errors() {
        let e: EngineError = DomainError::MessageIndexOutOfRange { index: 3, len: 1 }.into();
        assert_eq!(e.error_kind(), "not_found");
        let e: EngineError = DomainError::MissingField("content").into();
        assert_eq!(e.error_kind(), "validation");
        let e: EngineError = DomainError::SessionEnded(SessionId::from_raw("sess_a")).into();
        assert!(e.is_caller_error());
    }
}
