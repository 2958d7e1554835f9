use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::OptionalExtension;
use tracing::{debug, instrument};

use nudge_core::{Session, SessionId};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;
use crate::store::Versioned;

/// Row selection for [`SessionRepo::list`]. `None` fields do not filter.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionFilter {
    pub active: Option<bool>,
    pub owner_id: Option<String>,
}

impl SessionFilter {
    pub fn active() -> Self {
        Self {
            active: Some(true),
            owner_id: None,
        }
    }

    pub fn owner(owner_id: impl Into<String>) -> Self {
        Self {
            active: None,
            owner_id: Some(owner_id.into()),
        }
    }
}

/// Synchronous session persistence.
///
/// Each row holds the whole aggregate as a JSON document. The other
/// columns are copies used for lookup, ordering and retention, plus a
/// `version` counter checked on every replace.
pub struct SessionRepo {
    db: Database,
}

impl SessionRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a new session at version 1. Fails with `Duplicate` if the id exists.
    #[instrument(skip(self, session), fields(session_id = %session.session_id()))]
    pub fn insert(&self, session: &Session) -> Result<i64, StoreError> {
        let document = serde_json::to_string(session)?;
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sessions (session_id, owner_id, start_time, end_time, is_active,
                                       version, document, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?7, ?8)",
                rusqlite::params![
                    session.session_id().as_str(),
                    session.owner_id(),
                    row_helpers::timestamp(session.start_time()),
                    session.end_time().map(row_helpers::timestamp),
                    session.is_active(),
                    document,
                    row_helpers::timestamp(session.created_at()),
                    row_helpers::timestamp(session.updated_at()),
                ],
            )
            .map_err(|e| match StoreError::from(e) {
                StoreError::Duplicate(_) => {
                    StoreError::Duplicate(format!("session {}", session.session_id()))
                }
                other => other,
            })?;
            Ok(1)
        })
    }

    #[instrument(skip(self), fields(session_id = %id))]
    pub fn get(&self, id: &SessionId) -> Result<Versioned<Session>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT document, version FROM sessions WHERE session_id = ?1")?;
            let mut rows = stmt.query([id.as_str()])?;
            match rows.next()? {
                Some(row) => row_to_versioned(row),
                None => Err(StoreError::NotFound(format!("session {id}"))),
            }
        })
    }

    /// Overwrite a session if its stored version still equals `expected_version`.
    ///
    /// Returns the new version. A missing row is `NotFound`; a version
    /// mismatch is `Conflict` and leaves the row untouched.
    #[instrument(skip(self, session), fields(session_id = %session.session_id()))]
    pub fn replace(&self, session: &Session, expected_version: i64) -> Result<i64, StoreError> {
        let document = serde_json::to_string(session)?;
        let id = session.session_id();
        self.db.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE sessions
                 SET owner_id = ?1, end_time = ?2, is_active = ?3, document = ?4,
                     updated_at = ?5, version = version + 1
                 WHERE session_id = ?6 AND version = ?7",
                rusqlite::params![
                    session.owner_id(),
                    session.end_time().map(row_helpers::timestamp),
                    session.is_active(),
                    document,
                    row_helpers::timestamp(session.updated_at()),
                    id.as_str(),
                    expected_version,
                ],
            )?;
            if changed == 1 {
                return Ok(expected_version + 1);
            }

            let current: Option<i64> = conn
                .query_row(
                    "SELECT version FROM sessions WHERE session_id = ?1",
                    [id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            match current {
                None => Err(StoreError::NotFound(format!("session {id}"))),
                Some(v) => {
                    debug!(expected_version, stored_version = v, "version mismatch");
                    Err(StoreError::Conflict(format!(
                        "session {id} is at version {v}, expected {expected_version}"
                    )))
                }
            }
        })
    }

    /// Sessions matching `filter`, newest `start_time` first.
    #[instrument(skip(self))]
    pub fn list(&self, filter: &SessionFilter, limit: usize) -> Result<Vec<Session>, StoreError> {
        let mut sql = String::from("SELECT document, version FROM sessions WHERE 1 = 1");
        let mut params: Vec<Value> = Vec::new();
        if let Some(active) = filter.active {
            params.push(Value::Integer(i64::from(active)));
            sql.push_str(&format!(" AND is_active = ?{}", params.len()));
        }
        if let Some(owner) = &filter.owner_id {
            params.push(Value::Text(owner.clone()));
            sql.push_str(&format!(" AND owner_id = ?{}", params.len()));
        }
        params.push(Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
        sql.push_str(&format!(
            " ORDER BY start_time DESC, session_id DESC LIMIT ?{}",
            params.len()
        ));

        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(rusqlite::params_from_iter(params))?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_versioned(row)?.value);
            }
            Ok(sessions)
        })
    }

    /// Delete ended sessions whose end and last update both precede `cutoff`.
    #[instrument(skip(self), fields(cutoff = %cutoff))]
    pub fn delete_ended_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let cutoff = row_helpers::timestamp(cutoff);
        self.db.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM sessions
                 WHERE is_active = 0 AND end_time IS NOT NULL
                   AND end_time < ?1 AND updated_at < ?1",
                [&cutoff],
            )?;
            Ok(deleted)
        })
    }
}

fn row_to_versioned(row: &rusqlite::Row<'_>) -> Result<Versioned<Session>, StoreError> {
    let document: String = row_helpers::get(row, 0, "sessions", "document")?;
    let version: i64 = row_helpers::get(row, 1, "sessions", "version")?;
    Ok(Versioned {
        value: row_helpers::parse_json(&document, "sessions", "document")?,
        version,
    })
}
