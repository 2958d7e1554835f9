use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use nudge_core::{Session, SessionId};

use crate::database::Database;
use crate::error::StoreError;
use crate::sessions::{SessionFilter, SessionRepo};

/// A stored value with its optimistic-concurrency version.
#[derive(Clone, Debug, PartialEq)]
pub struct Versioned<T> {
    pub value: T,
    pub version: i64,
}

/// Durable keyed storage of session aggregates.
///
/// `replace` is a compare-and-swap on `version`; callers re-read on `Conflict`.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, session: Session) -> Result<i64, StoreError>;

    async fn get(&self, id: &SessionId) -> Result<Versioned<Session>, StoreError>;

    async fn replace(&self, session: Session, expected_version: i64) -> Result<i64, StoreError>;

    async fn list(&self, filter: SessionFilter, limit: usize) -> Result<Vec<Session>, StoreError>;

    async fn delete_ended_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError>;

    /// Liveness check for health reporting.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// [`SessionStore`] over SQLite. Every call runs on the blocking pool so
/// request tasks never hold a runtime worker during disk I/O.
#[derive(Clone)]
pub struct SqliteSessionStore {
    db: Database,
    repo: Arc<SessionRepo>,
}

impl SqliteSessionStore {
    pub fn new(db: Database) -> Self {
        let repo = Arc::new(SessionRepo::new(db.clone()));
        Self { db, repo }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&SessionRepo) -> Result<T, StoreError> + Send + 'static,
    {
        let repo = Arc::clone(&self.repo);
        tokio::task::spawn_blocking(move || f(&repo)).await?
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn insert(&self, session: Session) -> Result<i64, StoreError> {
        self.blocking(move |repo| repo.insert(&session)).await
    }

    async fn get(&self, id: &SessionId) -> Result<Versioned<Session>, StoreError> {
        let id = id.clone();
        self.blocking(move |repo| repo.get(&id)).await
    }

    async fn replace(&self, session: Session, expected_version: i64) -> Result<i64, StoreError> {
        self.blocking(move |repo| repo.replace(&session, expected_version))
            .await
    }

    async fn list(&self, filter: SessionFilter, limit: usize) -> Result<Vec<Session>, StoreError> {
        self.blocking(move |repo| repo.list(&filter, limit)).await
    }

    async fn delete_ended_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        self.blocking(move |repo| repo.delete_ended_before(cutoff))
            .await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || db.ping()).await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nudge_core::{NewMessage, SessionEvent, SessionMetadata};

    fn store() -> SqliteSessionStore {
        SqliteSessionStore::new(Database::in_memory().unwrap())
    }

    #[tokio::test]
    async fn round_trip_through_blocking_pool() {
        let store = store();
        let s = Session::create(None, SessionMetadata::default(), Utc::now());
        store.insert(s.clone()).await.unwrap();

        let next = s
            .apply(SessionEvent::MessageAdded(NewMessage::user("hello")), Utc::now())
            .unwrap()
            .into_session();
        assert_eq!(store.replace(next.clone(), 1).await.unwrap(), 2);

        let loaded = store.get(next.session_id()).await.unwrap();
        assert_eq!(loaded.version, 2);
        assert_eq!(loaded.value.messages().len(), 1);
        store.ping().await.unwrap();
    }

    #[tokio::test]
    async fn list_through_trait_object() {
        let store: Arc<dyn SessionStore> = Arc::new(store());
        for _ in 0..3 {
            store
                .insert(Session::create(Some("o".into()), SessionMetadata::default(), Utc::now()))
                .await
                .unwrap();
        }
        let listed = store.list(SessionFilter::owner("o"), 2).await.unwrap();
        assert_eq!(listed.len(), 2);
    }
}
