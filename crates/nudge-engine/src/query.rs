use std::sync::Arc;

use chrono::Utc;
use tracing::instrument;

use nudge_core::{Session, SessionId, SessionStats};
use nudge_store::{SessionFilter, SessionStore};

use crate::error::EngineError;

/// Page sizes for list queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ListLimits {
    pub default: usize,
    pub max: usize,
}

impl Default for ListLimits {
    fn default() -> Self {
        Self { default: 10, max: 100 }
    }
}

impl ListLimits {
    /// Missing or zero means the default; the result never exceeds `max`.
    pub fn resolve(&self, requested: Option<usize>) -> usize {
        let max = self.max.max(1);
        match requested {
            None | Some(0) => self.default.clamp(1, max),
            Some(n) => n.min(max),
        }
    }
}

/// Read-only access to stored sessions.
pub struct SessionQueryService {
    store: Arc<dyn SessionStore>,
    limits: ListLimits,
}

impl SessionQueryService {
    pub fn new(store: Arc<dyn SessionStore>, limits: ListLimits) -> Self {
        Self { store, limits }
    }

    #[instrument(skip(self), fields(session_id = %id))]
    pub async fn get_session(&self, id: &SessionId) -> Result<Session, EngineError> {
        Ok(self.store.get(id).await?.value)
    }

    #[instrument(skip(self), fields(session_id = %id))]
    pub async fn get_stats(&self, id: &SessionId) -> Result<SessionStats, EngineError> {
        let session = self.get_session(id).await?;
        Ok(session.stats(Utc::now()))
    }

    #[instrument(skip(self))]
    pub async fn recent_active(&self, limit: Option<usize>) -> Result<Vec<Session>, EngineError> {
        let limit = self.limits.resolve(limit);
        Ok(self.store.list(SessionFilter::active(), limit).await?)
    }

    #[instrument(skip(self))]
    pub async fn by_owner(&self, owner_id: &str, limit: Option<usize>) -> Result<Vec<Session>, EngineError> {
        let limit = self.limits.resolve(limit);
        Ok(self.store.list(SessionFilter::owner(owner_id), limit).await?)
    }

    /// Whether the backing store answers.
    pub async fn healthy(&self) -> bool {
        self.store.ping().await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use nudge_core::{NewMessage, SessionMetadata};
    use nudge_store::{Database, SqliteSessionStore};

    use crate::coordinator::SessionCoordinator;
    use crate::mutation::MutationEngine;

    fn services(limits: ListLimits) -> (MutationEngine, SessionQueryService) {
        let store: Arc<dyn SessionStore> =
            Arc::new(SqliteSessionStore::new(Database::in_memory().unwrap()));
        let coordinator = Arc::new(SessionCoordinator::new(Duration::from_secs(1)));
        (
            MutationEngine::new(Arc::clone(&store), coordinator),
            SessionQueryService::new(store, limits),
        )
    }

    #[test]
    fn limits_default_and_clamp() {
        let l = ListLimits { default: 10, max: 50 };
        assert_eq!(l.resolve(None), 10);
        assert_eq!(l.resolve(Some(0)), 10);
        assert_eq!(l.resolve(Some(3)), 3);
        assert_eq!(l.resolve(Some(500)), 50);
    }

    #[test]
    fn default_above_max_is_clamped() {
        let l = ListLimits { default: 25, max: 5 };
        assert_eq!(l.resolve(None), 5);
        assert_eq!(l.resolve(Some(0)), 5);

        let zero = ListLimits { default: 10, max: 0 };
        assert_eq!(zero.resolve(None), 1);
        assert_eq!(zero.resolve(Some(7)), 1);
    }

    #[tokio::test]
    async fn stats_projection() {
        let (engine, query) = services(ListLimits::default());
        let s = engine.create_session(None, SessionMetadata::default()).await.unwrap();
        let id = s.session_id();
        engine.add_message(id, NewMessage::user("hi")).await.unwrap();
        engine.end_session(id).await.unwrap();

        let stats = query.get_stats(id).await.unwrap();
        assert_eq!(&stats.session_id, id);
        assert!(!stats.is_active);
        assert_eq!(stats.rollups.total_messages, 1);
        let end = stats.end_time.unwrap();
        assert_eq!(stats.duration, (end - stats.start_time).num_milliseconds());
    }

    #[tokio::test]
    async fn recent_active_excludes_ended() {
        let (engine, query) = services(ListLimits::default());
        let a = engine.create_session(None, SessionMetadata::default()).await.unwrap();
        let b = engine.create_session(None, SessionMetadata::default()).await.unwrap();
        engine.end_session(a.session_id()).await.unwrap();

        let active = query.recent_active(None).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].session_id(), b.session_id());
    }

    #[tokio::test]
    async fn by_owner_respects_limit() {
        let (engine, query) = services(ListLimits { default: 2, max: 3 });
        for _ in 0..5 {
            engine
                .create_session(Some("owner".into()), SessionMetadata::default())
                .await
                .unwrap();
        }
        engine.create_session(Some("other".into()), SessionMetadata::default()).await.unwrap();

        assert_eq!(query.by_owner("owner", None).await.unwrap().len(), 2);
        assert_eq!(query.by_owner("owner", Some(100)).await.unwrap().len(), 3);
        assert_eq!(query.by_owner("other", None).await.unwrap().len(), 1);
        assert!(query.healthy().await);
    }

    #[tokio::test]
    async fn missing_session_is_not_found() {
        let (_, query) = services(ListLimits::default());
        let err = query.get_stats(&SessionId::from_raw("sess_missing")).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }
}
