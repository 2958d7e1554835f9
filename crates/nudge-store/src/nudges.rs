use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::OptionalExtension;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use nudge_core::{FeedbackType, Nudge, NudgeId, NudgeProvider, NudgeSourceError};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

const DEFAULT_CATEGORY: &str = "General";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NudgeRow {
    pub id: NudgeId,
    pub text: String,
    pub category: String,
    pub usage_count: i64,
    pub positive_feedback: i64,
    pub negative_feedback: i64,
    pub created_at: String,
}

impl From<NudgeRow> for Nudge {
    fn from(row: NudgeRow) -> Self {
        Nudge {
            id: row.id,
            text: row.text,
            category: row.category,
        }
    }
}

/// Catalogue of prompt suggestions with usage and feedback counters.
pub struct NudgeRepo {
    db: Database,
}

impl NudgeRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Add a nudge; a blank category falls back to "General".
    #[instrument(skip(self, text))]
    pub fn insert(&self, text: &str, category: Option<&str>) -> Result<NudgeRow, StoreError> {
        let row = NudgeRow {
            id: NudgeId::new(),
            text: text.to_string(),
            category: category
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .unwrap_or(DEFAULT_CATEGORY)
                .to_string(),
            usage_count: 0,
            positive_feedback: 0,
            negative_feedback: 0,
            created_at: row_helpers::timestamp(Utc::now()),
        };
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO nudges (id, text, category, created_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![row.id.as_str(), row.text, row.category, row.created_at],
            )?;
            Ok(())
        })?;
        Ok(row)
    }

    #[instrument(skip(self), fields(nudge_id = %id))]
    pub fn get(&self, id: &NudgeId) -> Result<NudgeRow, StoreError> {
        self.db.with_conn(|conn| select_one(conn, id))
    }

    /// Pick a nudge uniformly at random and count the use. `None` when empty.
    #[instrument(skip(self))]
    pub fn random(&self) -> Result<Option<NudgeRow>, StoreError> {
        self.db.with_tx(|tx| {
            let picked: Option<String> = tx
                .query_row("SELECT id FROM nudges ORDER BY RANDOM() LIMIT 1", [], |row| row.get(0))
                .optional()?;
            let Some(id) = picked else {
                return Ok(None);
            };
            tx.execute(
                "UPDATE nudges SET usage_count = usage_count + 1 WHERE id = ?1",
                [&id],
            )?;
            select_one(tx, &NudgeId::from_raw(id)).map(Some)
        })
    }

    #[instrument(skip(self), fields(nudge_id = %id, feedback = %feedback))]
    pub fn record_feedback(&self, id: &NudgeId, feedback: FeedbackType) -> Result<NudgeRow, StoreError> {
        let sql = match feedback {
            FeedbackType::Positive => {
                "UPDATE nudges SET positive_feedback = positive_feedback + 1 WHERE id = ?1"
            }
            FeedbackType::Negative => {
                "UPDATE nudges SET negative_feedback = negative_feedback + 1 WHERE id = ?1"
            }
        };
        self.db.with_tx(|tx| {
            if tx.execute(sql, [id.as_str()])? == 0 {
                return Err(StoreError::NotFound(format!("nudge {id}")));
            }
            select_one(tx, id)
        })
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        self.db.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM nudges", [], |row| row.get(0))?;
            Ok(usize::try_from(n).unwrap_or(0))
        })
    }
}

fn select_one(conn: &rusqlite::Connection, id: &NudgeId) -> Result<NudgeRow, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, text, category, usage_count, positive_feedback, negative_feedback, created_at
         FROM nudges WHERE id = ?1",
    )?;
    let mut rows = stmt.query([id.as_str()])?;
    match rows.next()? {
        Some(row) => Ok(NudgeRow {
            id: NudgeId::from_raw(row_helpers::get::<String>(row, 0, "nudges", "id")?),
            text: row_helpers::get(row, 1, "nudges", "text")?,
            category: row_helpers::get(row, 2, "nudges", "category")?,
            usage_count: row_helpers::get(row, 3, "nudges", "usage_count")?,
            positive_feedback: row_helpers::get(row, 4, "nudges", "positive_feedback")?,
            negative_feedback: row_helpers::get(row, 5, "nudges", "negative_feedback")?,
            created_at: row_helpers::get(row, 6, "nudges", "created_at")?,
        }),
        None => Err(StoreError::NotFound(format!("nudge {id}"))),
    }
}

/// [`NudgeProvider`] that draws from the catalogue table.
#[derive(Clone)]
pub struct StoreNudgeProvider {
    repo: Arc<NudgeRepo>,
}

impl StoreNudgeProvider {
    pub fn new(repo: Arc<NudgeRepo>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl NudgeProvider for StoreNudgeProvider {
    async fn next_nudge(&self) -> Result<Option<Nudge>, NudgeSourceError> {
        let repo = Arc::clone(&self.repo);
        tokio::task::spawn_blocking(move || repo.random())
            .await
            .map_err(|e| NudgeSourceError(e.to_string()))?
            .map(|row| row.map(Nudge::from))
            .map_err(|e| NudgeSourceError(e.to_string()))
    }
}
