use std::sync::Arc;
use tokio::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use nudge_core::{
    ChatTurn, CompletionProvider, DomainError, NewMessage, NudgeProvider, Role, Session, SessionId,
};

use crate::error::EngineError;
use crate::mutation::MutationEngine;

#[derive(Clone, Debug, Deserialize)]
pub struct ChatMessageBody {
    pub role: String,
    pub content: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<ChatMessageBody>,
    #[serde(default)]
    pub session_id: Option<String>,
    /// Record the last user turn as well as the reply.
    #[serde(default)]
    pub record_user: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub content: String,
    pub tokens_used: u64,
    pub model: String,
    pub response_time_ms: u64,
}

/// Completion proxy that optionally records the exchange on a session.
pub struct ChatService {
    completions: Arc<dyn CompletionProvider>,
    nudges: Arc<dyn NudgeProvider>,
    mutations: Arc<MutationEngine>,
}

impl ChatService {
    pub fn new(
        completions: Arc<dyn CompletionProvider>,
        nudges: Arc<dyn NudgeProvider>,
        mutations: Arc<MutationEngine>,
    ) -> Self {
        Self {
            completions,
            nudges,
            mutations,
        }
    }

    #[instrument(skip(self, request), fields(provider = self.completions.name(), turns = request.messages.len()))]
    pub async fn complete(&self, request: ChatRequest) -> Result<ChatReply, EngineError> {
        if request.messages.is_empty() {
            return Err(DomainError::MissingField("messages").into());
        }
        let turns = request
            .messages
            .into_iter()
            .map(|m| Ok(ChatTurn::new(m.role.parse::<Role>()?, m.content)))
            .collect::<Result<Vec<_>, DomainError>>()?;
        let session_id = request
            .session_id
            .filter(|s| !s.trim().is_empty())
            .map(SessionId::from_raw);

        if let (Some(id), true) = (&session_id, request.record_user) {
            if let Some(last) = turns.iter().rev().find(|t| t.role == Role::User) {
                self.mutations
                    .add_message(id, NewMessage::user(last.content.clone()))
                    .await?;
            }
        }

        let started = Instant::now();
        let completion = self.completions.complete(&turns).await.map_err(|e| {
            warn!(kind = e.error_kind(), error = %e, "completion failed");
            EngineError::from(e)
        })?;
        let response_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(response_time_ms, tokens = completion.tokens_used, "completion received");

        if let Some(id) = &session_id {
            let message = NewMessage::assistant(completion.content.clone())
                .with_response_time(response_time_ms)
                .with_tokens(completion.tokens_used)
                .with_model(completion.model.clone());
            self.mutations.add_message(id, message).await?;
        }

        Ok(ChatReply {
            content: completion.content,
            tokens_used: completion.tokens_used,
            model: completion.model,
            response_time_ms,
        })
    }

    /// Surface a nudge from the catalogue as an assistant message.
    #[instrument(skip(self), fields(session_id = %id))]
    pub async fn push_nudge(&self, id: &SessionId) -> Result<Session, EngineError> {
        let nudge = self
            .nudges
            .next_nudge()
            .await?
            .ok_or_else(|| EngineError::NotFound("no nudges available".into()))?;
        self.mutations.add_message(id, NewMessage::from_nudge(&nudge)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use nudge_core::{Completion, GatewayError, Nudge, NudgeId, NudgeSourceError, SessionMetadata};
    use nudge_store::{Database, SessionStore, SqliteSessionStore};

    use crate::coordinator::SessionCoordinator;

    struct Echo {
        delay: Duration,
        fail: bool,
    }

    #[async_trait]
    impl CompletionProvider for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn complete(&self, turns: &[ChatTurn]) -> Result<Completion, GatewayError> {
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(GatewayError::ServerError {
                    status: 502,
                    body: "bad gateway".into(),
                });
            }
            let last = turns.last().map(|t| t.content.clone()).unwrap_or_default();
            Ok(Completion {
                content: format!("echo: {last}"),
                tokens_used: 17,
                model: "echo-1".into(),
            })
        }
    }

    struct OneNudge(Option<Nudge>);

    #[async_trait]
    impl NudgeProvider for OneNudge {
        async fn next_nudge(&self) -> Result<Option<Nudge>, NudgeSourceError> {
            Ok(self.0.clone())
        }
    }

    fn service(provider: Echo, nudge: Option<Nudge>) -> (ChatService, Arc<MutationEngine>, Arc<dyn SessionStore>) {
        let store: Arc<dyn SessionStore> =
            Arc::new(SqliteSessionStore::new(Database::in_memory().unwrap()));
        let engine = Arc::new(MutationEngine::new(
            Arc::clone(&store),
            Arc::new(SessionCoordinator::new(Duration::from_secs(1))),
        ));
        let chat = ChatService::new(Arc::new(provider), Arc::new(OneNudge(nudge)), Arc::clone(&engine));
        (chat, engine, store)
    }

    fn request(session: Option<&SessionId>, record_user: bool) -> ChatRequest {
        ChatRequest {
            messages: vec![ChatMessageBody {
                role: "user".into(),
                content: "hello".into(),
            }],
            session_id: session.map(|s| s.to_string()),
            record_user,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn records_reply_with_measured_response_time() {
        let (chat, engine, store) = service(Echo { delay: Duration::from_millis(250), fail: false }, None);
        let s = engine.create_session(None, SessionMetadata::default()).await.unwrap();

        let reply = chat.complete(request(Some(s.session_id()), true)).await.unwrap();
        assert_eq!(reply.content, "echo: hello");
        assert!(reply.response_time_ms >= 250);

        let stored = store.get(s.session_id()).await.unwrap().value;
        let msgs = stored.messages();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].role, Role::User);
        assert_eq!(msgs[1].tokens_used, 17);
        assert_eq!(msgs[1].model, "echo-1");
        assert_eq!(msgs[1].response_time_ms, Some(reply.response_time_ms));
    }

    #[tokio::test]
    async fn without_session_nothing_is_recorded() {
        let (chat, _, _) = service(Echo { delay: Duration::ZERO, fail: false }, None);
        let reply = chat.complete(request(None, true)).await.unwrap();
        assert_eq!(reply.tokens_used, 17);
    }

    #[tokio::test]
    async fn provider_failure_records_only_the_user_turn() {
        let (chat, engine, store) = service(Echo { delay: Duration::ZERO, fail: true }, None);
        let s = engine.create_session(None, SessionMetadata::default()).await.unwrap();
        let err = chat.complete(request(Some(s.session_id()), true)).await.unwrap_err();
        assert!(matches!(err, EngineError::Gateway(_)));
        assert_eq!(store.get(s.session_id()).await.unwrap().value.messages().len(), 1);
    }

    #[tokio::test]
    async fn rejects_empty_and_unknown_roles() {
        let (chat, _, _) = service(Echo { delay: Duration::ZERO, fail: false }, None);
        let err = chat.complete(ChatRequest::default()).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let mut req = request(None, false);
        req.messages[0].role = "system".into();
        assert!(matches!(chat.complete(req).await, Err(EngineError::Validation(_))));
    }

    #[tokio::test]
    async fn push_nudge_appends_nudge_message() {
        let nudge = Nudge {
            id: NudgeId::from_raw("ndg_1"),
            text: "What would a skeptic say?".into(),
            category: "Reasoning".into(),
        };
        let (chat, engine, _) = service(Echo { delay: Duration::ZERO, fail: false }, Some(nudge));
        let s = engine.create_session(None, SessionMetadata::default()).await.unwrap();
        let s = chat.push_nudge(s.session_id()).await.unwrap();
        let m = &s.messages()[0];
        assert!(m.is_nudge);
        assert_eq!(m.nudge_ref, Some(NudgeId::from_raw("ndg_1")));
        assert_eq!(s.rollups().total_nudges, 1);
    }

    #[tokio::test]
    async fn push_nudge_with_empty_catalogue_is_not_found() {
        let (chat, engine, _) = service(Echo { delay: Duration::ZERO, fail: false }, None);
        let s = engine.create_session(None, SessionMetadata::default()).await.unwrap();
        assert!(matches!(chat.push_nudge(s.session_id()).await, Err(EngineError::NotFound(_))));
    }
}
