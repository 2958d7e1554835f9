use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use nudge_core::{DomainError, FeedbackType, NudgeId, SessionId};
use nudge_engine::requests::{
    parse_index, AddMessageRequest, CardRequest, CreateSessionRequest, FeedbackRequest,
    ScratchpadRequest, SpinRequest,
};
use nudge_engine::{ChatRequest, EngineError};
use nudge_store::{NudgeRepo, StoreError};

use crate::envelope::{ok, parse_body, success, ApiError, Context};
use crate::server::AppState;

type ApiResult = Result<Response, ApiError>;

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<String>,
}

impl ListQuery {
    fn limit(&self) -> Result<Option<usize>, DomainError> {
        self.limit
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<usize>().map_err(|_| DomainError::InvalidValue {
                    field: "limit",
                    value: s.to_owned(),
                    expected: "a non-negative integer",
                })
            })
            .transpose()
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

async fn with_nudges<T, F>(repo: &Arc<NudgeRepo>, f: F) -> Result<T, EngineError>
where
    T: Send + 'static,
    F: FnOnce(&NudgeRepo) -> Result<T, StoreError> + Send + 'static,
{
    let repo = Arc::clone(repo);
    tokio::task::spawn_blocking(move || f(&repo))
        .await
        .map_err(|e| EngineError::Storage(e.into()))?
        .map_err(EngineError::from)
}

pub async fn health(State(state): State<AppState>) -> Response {
    if state.queries.healthy().await {
        (StatusCode::OK, Json(json!({"status": "healthy"}))).into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"status": "unhealthy"}))).into_response()
    }
}

// ── sessions ────────────────────────────────────────────────────────────

pub async fn create_session(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> ApiResult {
    const MSG: &str = "Failed to create session";
    let req: CreateSessionRequest = parse_body(&body, MSG)?;

    let mut metadata = req.metadata.unwrap_or_default();
    if metadata.user_agent.is_none() {
        metadata.user_agent = header_value(&headers, header::USER_AGENT.as_str());
    }
    if metadata.ip_address.is_none() {
        metadata.ip_address = header_value(&headers, "x-forwarded-for")
            .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_owned()));
    }

    let owner = req.owner_id.filter(|o| !o.trim().is_empty());
    let session = state.mutations.create_session(owner, metadata).await.context(MSG)?;
    Ok(success(
        StatusCode::CREATED,
        json!({
            "sessionId": session.session_id(),
            "message": "Session created successfully",
        }),
    ))
}

pub async fn get_session(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let session = state
        .queries
        .get_session(&SessionId::from_raw(id))
        .await
        .context("Failed to get session")?;
    Ok(ok(json!({ "session": session })))
}

pub async fn get_stats(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let stats = state
        .queries
        .get_stats(&SessionId::from_raw(id))
        .await
        .context("Failed to get session stats")?;
    Ok(ok(json!({ "stats": stats })))
}

pub async fn add_message(State(state): State<AppState>, Path(id): Path<String>, body: Bytes) -> ApiResult {
    const MSG: &str = "Failed to add message to session";
    let message = parse_body::<AddMessageRequest>(&body, MSG)?
        .into_message()
        .context(MSG)?;
    let session = state
        .mutations
        .add_message(&SessionId::from_raw(id), message)
        .await
        .context(MSG)?;
    Ok(ok(json!({ "message": "Message added to session", "session": session })))
}

pub async fn set_feedback(
    State(state): State<AppState>,
    Path((id, index)): Path<(String, String)>,
    body: Bytes,
) -> ApiResult {
    const MSG: &str = "Failed to update feedback";
    let index = parse_index(&index).context(MSG)?;
    let feedback = parse_body::<FeedbackRequest>(&body, MSG)?
        .into_feedback()
        .context(MSG)?;
    let session = state
        .mutations
        .set_feedback(&SessionId::from_raw(id), index, feedback)
        .await
        .context(MSG)?;
    Ok(ok(json!({ "message": "Feedback updated successfully", "session": session })))
}

pub async fn add_spin(
    State(state): State<AppState>,
    Path((id, index)): Path<(String, String)>,
    body: Bytes,
) -> ApiResult {
    const MSG: &str = "Failed to track spin interaction";
    let index = parse_index(&index).context(MSG)?;
    let action = parse_body::<SpinRequest>(&body, MSG)?
        .into_action()
        .context(MSG)?;
    let session = state
        .mutations
        .add_spin_interaction(&SessionId::from_raw(id), index, action)
        .await
        .context(MSG)?;
    Ok(ok(json!({ "message": "Spin interaction tracked successfully", "session": session })))
}

pub async fn add_card(State(state): State<AppState>, Path(id): Path<String>, body: Bytes) -> ApiResult {
    const MSG: &str = "Failed to track card interaction";
    let card = parse_body::<CardRequest>(&body, MSG)?
        .into_interaction()
        .context(MSG)?;
    let session = state
        .mutations
        .add_card_interaction(&SessionId::from_raw(id), card)
        .await
        .context(MSG)?;
    Ok(ok(json!({ "message": "Card interaction tracked successfully", "session": session })))
}

pub async fn end_session(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let session = state
        .mutations
        .end_session(&SessionId::from_raw(id))
        .await
        .context("Failed to end session")?;
    Ok(ok(json!({ "message": "Session ended successfully", "session": session })))
}

pub async fn add_scratchpad_snapshot(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult {
    const MSG: &str = "Failed to add scratchpad snapshot";
    let text = parse_body::<ScratchpadRequest>(&body, MSG)?
        .into_text()
        .context(MSG)?;
    let session = state
        .mutations
        .add_scratchpad_snapshot(&SessionId::from_raw(id), text)
        .await
        .context(MSG)?;
    Ok(ok(json!({ "message": "Scratchpad snapshot added", "session": session })))
}

pub async fn push_nudge(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let session = state
        .chat
        .push_nudge(&SessionId::from_raw(id))
        .await
        .context("Failed to add nudge to session")?;
    Ok(ok(json!({ "message": "Nudge added to session", "session": session })))
}

pub async fn recent_active(State(state): State<AppState>, Query(q): Query<ListQuery>) -> ApiResult {
    const MSG: &str = "Failed to get recent sessions";
    let sessions = state
        .queries
        .recent_active(q.limit().context(MSG)?)
        .await
        .context(MSG)?;
    Ok(ok(json!({ "sessions": sessions })))
}

pub async fn by_owner(
    State(state): State<AppState>,
    Path(owner): Path<String>,
    Query(q): Query<ListQuery>,
) -> ApiResult {
    const MSG: &str = "Failed to get user sessions";
    let sessions = state
        .queries
        .by_owner(&owner, q.limit().context(MSG)?)
        .await
        .context(MSG)?;
    Ok(ok(json!({ "sessions": sessions })))
}

// ── chat ────────────────────────────────────────────────────────────────

pub async fn chat(State(state): State<AppState>, body: Bytes) -> ApiResult {
    const MSG: &str = "Failed to get chat completion";
    let req: ChatRequest = parse_body(&body, MSG)?;
    let reply = state.chat.complete(req).await.context(MSG)?;
    Ok(ok(reply))
}

// ── nudges ──────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct NewNudgeBody {
    pub text: Option<String>,
    pub category: Option<String>,
}

pub async fn random_nudge(State(state): State<AppState>) -> ApiResult {
    const MSG: &str = "Failed to get random nudge";
    let nudge = with_nudges(&state.nudges, |repo| repo.random())
        .await
        .context(MSG)?
        .ok_or_else(|| ApiError::new(MSG, EngineError::NotFound("no nudges found".into())))?;
    Ok(ok(json!({ "nudge": nudge })))
}

pub async fn nudge_feedback(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult {
    const MSG: &str = "Failed to update feedback";
    let feedback: FeedbackType = parse_body::<FeedbackRequest>(&body, MSG)?
        .into_feedback()
        .context(MSG)?;
    let id = NudgeId::from_raw(id);
    let nudge = with_nudges(&state.nudges, move |repo| repo.record_feedback(&id, feedback))
        .await
        .context(MSG)?;
    Ok(ok(json!({ "nudge": nudge })))
}

pub async fn create_nudge(State(state): State<AppState>, body: Bytes) -> ApiResult {
    const MSG: &str = "Failed to create nudge";
    let req: NewNudgeBody = parse_body(&body, MSG)?;
    let text = req
        .text
        .filter(|t| !t.trim().is_empty())
        .ok_or(DomainError::MissingField("text"))
        .context(MSG)?;
    let nudge = with_nudges(&state.nudges, move |repo| repo.insert(&text, req.category.as_deref()))
        .await
        .context(MSG)?;
    Ok(success(StatusCode::CREATED, json!({ "nudge": nudge })))
}
