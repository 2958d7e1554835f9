//! Response envelope shared by every route.
//!
//! Success: `{"success": true, ...payload}`.
//! Failure: `{"success": false, "message", "error", "code"}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::{json, Map, Value};

use nudge_core::DomainError;
use nudge_engine::EngineError;
use nudge_store::StoreError;

/// A failed request: what was being attempted, and why it failed.
#[derive(Debug)]
pub struct ApiError {
    pub message: &'static str,
    pub source: EngineError,
}

impl ApiError {
    pub fn new(message: &'static str, source: impl Into<EngineError>) -> Self {
        Self {
            message,
            source: source.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        status_for(&self.source)
    }
}

/// Attach an operation description to an engine failure.
pub trait Context<T> {
    fn context(self, message: &'static str) -> Result<T, ApiError>;
}

impl<T, E: Into<EngineError>> Context<T> for Result<T, E> {
    fn context(self, message: &'static str) -> Result<T, ApiError> {
        self.map_err(|e| ApiError::new(message, e))
    }
}

pub fn status_for(e: &EngineError) -> StatusCode {
    match e {
        EngineError::NotFound(_) => StatusCode::NOT_FOUND,
        EngineError::Validation(_) => StatusCode::BAD_REQUEST,
        EngineError::Conflict(_) | EngineError::SessionEnded(_) => StatusCode::CONFLICT,
        EngineError::Busy { .. } => StatusCode::SERVICE_UNAVAILABLE,
        EngineError::Gateway(_) => StatusCode::BAD_GATEWAY,
        EngineError::Storage(_) | EngineError::NudgeSource(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = json!({
            "success": false,
            "message": self.message,
            "error": self.source.to_string(),
            "code": self.source.error_kind(),
        });
        (status, Json(body)).into_response()
    }
}

/// Parse a JSON request body. An empty body reads as `T::default()`.
pub fn parse_body<T>(bytes: &[u8], message: &'static str) -> Result<T, ApiError>
where
    T: serde::de::DeserializeOwned + Default,
{
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(bytes).map_err(|e| {
        ApiError::new(
            message,
            EngineError::Validation(format!("invalid request body: {e}")),
        )
    })
}

/// Successful response: `payload`'s fields merged beside `success: true`.
pub fn success(status: StatusCode, payload: impl Serialize) -> Response {
    let mut body = Map::new();
    body.insert("success".into(), Value::Bool(true));
    match serde_json::to_value(payload) {
        Ok(Value::Object(fields)) => body.extend(fields),
        Ok(Value::Null) => {}
        Ok(other) => {
            body.insert("result".into(), other);
        }
        Err(e) => {
            return ApiError::new(
                "Failed to encode response",
                EngineError::Storage(StoreError::Serialization(e.to_string())),
            )
            .into_response()
        }
    }
    (status, Json(Value::Object(body))).into_response()
}

pub fn ok(payload: impl Serialize) -> Response {
    success(StatusCode::OK, payload)
}

impl From<DomainError> for ApiError {
    fn from(e: DomainError) -> Self {
        ApiError::new("Invalid request", e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nudge_core::SessionId;

    #[test]
    fn status_mapping() {
        assert_eq!(status_for(&EngineError::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(status_for(&EngineError::Validation("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(&EngineError::SessionEnded(SessionId::from_raw("sess_a"))),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&EngineError::Busy {
                session_id: SessionId::from_raw("sess_a"),
                waited: std::time::Duration::from_secs(1),
            }),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn empty_body_is_default() {
        #[derive(Debug, Default, serde::Deserialize)]
        struct Body {
            text: Option<String>,
        }
        let b: Body = parse_body(b"  ", "x").unwrap();
        assert!(b.text.is_none());
        let err = parse_body::<Body>(b"{nope", "Failed").unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "Failed");
    }
}
