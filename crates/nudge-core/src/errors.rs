use std::time::Duration;

use crate::ids::SessionId;

/// Rule violations raised by the session aggregate and the value parsers.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    #[error("invalid {field} {value:?}: must be one of {expected}")]
    InvalidValue {
        field: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("{field} must be non-negative, got {value}")]
    Negative { field: &'static str, value: i64 },

    #[error("message index {index} not found (session has {len} messages)")]
    MessageIndexOutOfRange { index: i64, len: usize },

    #[error("session {0} has ended")]
    SessionEnded(SessionId),
}

impl DomainError {
    /// True when the error names something that does not exist rather than a malformed value.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::MessageIndexOutOfRange { .. })
    }
}

/// Failures talking to the completion endpoint.
#[derive(Clone, Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },
    #[error("server error {status}: {body}")]
    ServerError { status: u16, body: String },
    #[error("network error: {0}")]
    NetworkError(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("timeout after {0:?}")]
    Timeout(Duration),
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::ServerError { .. } | Self::NetworkError(_)
        )
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed(_) => "authentication_failed",
            Self::InvalidRequest(_) => "invalid_request",
            Self::RateLimited { .. } => "rate_limited",
            Self::ServerError { .. } => "server_error",
            Self::NetworkError(_) => "network_error",
            Self::MalformedResponse(_) => "malformed_response",
            Self::Timeout(_) => "timeout",
        }
    }

    /// Classify an HTTP status code into the appropriate error variant.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => Self::AuthenticationFailed(body),
            400 | 404 | 422 => Self::InvalidRequest(body),
            429 => Self::RateLimited { retry_after: None },
            500..=599 => Self::ServerError { status, body },
            _ => Self::InvalidRequest(format!("unexpected status {status}: {body}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_error_is_not_found() {
        let err = DomainError::MessageIndexOutOfRange { index: 4, len: 2 };
        assert!(err.is_not_found());
        assert!(!DomainError::MissingField("content").is_not_found());
    }

    #[test]
    fn invalid_value_message_lists_choices() {
        let err = DomainError::InvalidValue {
            field: "role",
            value: "system".into(),
            expected: "user, assistant",
        };
        assert_eq!(
            err.to_string(),
            "invalid role \"system\": must be one of user, assistant"
        );
    }

    #[test]
    fn from_status_mapping() {
        assert!(matches!(
            GatewayError::from_status(401, "nope".into()),
            GatewayError::AuthenticationFailed(_)
        ));
        assert!(GatewayError::from_status(429, String::new()).is_retryable());
        assert!(GatewayError::from_status(503, "busy".into()).is_retryable());
        assert!(!GatewayError::from_status(400, "bad".into()).is_retryable());
        assert_eq!(GatewayError::from_status(418, "tea".into()).error_kind(), "invalid_request");
    }
}
