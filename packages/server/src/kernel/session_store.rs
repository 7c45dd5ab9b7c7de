//! Durable per-chat session state with optimistic concurrency.
//!
//! Every stored record carries a revision. Writers state the revision they loaded;
//! if another writer got there first the write fails with [`StoreError::Conflict`]
//! and the event that produced it is dropped.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use sqlx::types::Json;
use sqlx::PgPool;
use thiserror::Error;

use crate::common::{ChatId, TimerHandle};
use crate::domains::pomodoro::models::{SessionRecord, SessionStatus};
use crate::kernel::traits::BaseSessionStore;

// =============================================================================
// Store Error
// =============================================================================

/// `Conflict` means another writer moved the record since it was loaded; expected
/// under concurrency. `Backend` means storage itself failed.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("revision conflict: session was modified concurrently")]
    Conflict,

    #[error("storage backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Backend(err.into())
    }
}

// =============================================================================
// Revision
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Revision(pub u64);

impl Revision {
    /// Sentinel for a record that has never been saved.
    pub const NONE: Revision = Revision(0);

    pub fn new(value: u64) -> Self {
        Revision(value)
    }

    pub fn next(self) -> Self {
        Revision(self.0.saturating_add(1))
    }

    pub fn is_none(&self) -> bool {
        self.0 == 0
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Postgres implementation
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct SessionRow {
    chat_id: i64,
    revision: i64,
    phase: String,
    step_index: Option<i32>,
    duration_minutes: Option<i32>,
    timer_handle: Option<String>,
    ritual_answers: Json<IndexMap<String, String>>,
    started_at: Option<DateTime<Utc>>,
    reflection_answers: Json<IndexMap<String, String>>,
}

impl SessionRow {
    fn into_record(self) -> anyhow::Result<(SessionRecord, Revision)> {
        let status = SessionStatus::from_parts(&self.phase, self.step_index)?;
        let duration = self
            .duration_minutes
            .map(u32::try_from)
            .transpose()
            .map_err(|_| anyhow::anyhow!("Negative duration for chat {}", self.chat_id))?;

        let record = SessionRecord {
            chat_id: ChatId(self.chat_id),
            status,
            duration,
            timer_handle: self.timer_handle.map(TimerHandle::new),
            ritual_answers: self.ritual_answers.0,
            started_at: self.started_at,
            reflection_answers: self.reflection_answers.0,
        };
        Ok((record, Revision(self.revision as u64)))
    }
}

#[derive(Clone)]
pub struct PostgresSessionStore {
    pool: PgPool,
}

impl PostgresSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BaseSessionStore for PostgresSessionStore {
    async fn load(&self, chat_id: ChatId) -> Result<(SessionRecord, Revision), StoreError> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT chat_id, revision, phase, step_index, duration_minutes, timer_handle,
                   ritual_answers, started_at, reflection_answers
            FROM pomodoro_sessions
            WHERE chat_id = $1
            "#,
        )
        .bind(chat_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(row.into_record()?),
            None => Ok((SessionRecord::idle(chat_id), Revision::NONE)),
        }
    }

    async fn save(
        &self,
        record: &SessionRecord,
        expected: Revision,
    ) -> Result<Revision, StoreError> {
        let (phase, step_index) = record.status.to_parts();
        let duration = record.duration.map(|m| m as i32);
        let timer_handle = record.timer_handle.as_ref().map(|h| h.as_str());
        let next = expected.next();
        // Bound as text and cast in SQL: a JSONB parameter would reorder the keys.
        let ritual_answers = serde_json::to_string(&record.ritual_answers)
            .map_err(|e| StoreError::Backend(e.into()))?;
        let reflection_answers = serde_json::to_string(&record.reflection_answers)
            .map_err(|e| StoreError::Backend(e.into()))?;

        let result = if expected.is_none() {
            sqlx::query(
                r#"
                INSERT INTO pomodoro_sessions (
                    chat_id, revision, phase, step_index, duration_minutes, timer_handle,
                    ritual_answers, started_at, reflection_answers, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7::json, $8, $9::json, NOW())
                ON CONFLICT (chat_id) DO NOTHING
                "#,
            )
            .bind(record.chat_id.as_i64())
            .bind(next.value() as i64)
            .bind(phase)
            .bind(step_index)
            .bind(duration)
            .bind(timer_handle)
            .bind(&ritual_answers)
            .bind(record.started_at)
            .bind(&reflection_answers)
            .execute(&self.pool)
            .await?
        } else {
            sqlx::query(
                r#"
                UPDATE pomodoro_sessions
                SET revision = $2,
                    phase = $3,
                    step_index = $4,
                    duration_minutes = $5,
                    timer_handle = $6,
                    ritual_answers = $7::json,
                    started_at = $8,
                    reflection_answers = $9::json,
                    updated_at = NOW()
                WHERE chat_id = $1 AND revision = $10
                "#,
            )
            .bind(record.chat_id.as_i64())
            .bind(next.value() as i64)
            .bind(phase)
            .bind(step_index)
            .bind(duration)
            .bind(timer_handle)
            .bind(&ritual_answers)
            .bind(record.started_at)
            .bind(&reflection_answers)
            .bind(expected.value() as i64)
            .execute(&self.pool)
            .await?
        };

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict);
        }
        Ok(next)
    }

    async fn delete(&self, chat_id: ChatId, expected: Revision) -> Result<(), StoreError> {
        if expected.is_none() {
            // Never saved, nothing to delete.
            return Ok(());
        }

        let result = sqlx::query("DELETE FROM pomodoro_sessions WHERE chat_id = $1 AND revision = $2")
            .bind(chat_id.as_i64())
            .bind(expected.value() as i64)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revision_sequence() {
        assert!(Revision::NONE.is_none());
        assert_eq!(Revision::NONE.next(), Revision(1));
        assert_eq!(Revision(u64::MAX).next(), Revision(u64::MAX));
    }

    #[test]
    fn test_row_maps_to_record() {
        let mut ritual = IndexMap::new();
        ritual.insert("task".to_string(), "write".to_string());
        let row = SessionRow {
            chat_id: 42,
            revision: 3,
            phase: "ritual".into(),
            step_index: Some(1),
            duration_minutes: Some(30),
            timer_handle: None,
            ritual_answers: Json(ritual),
            started_at: None,
            reflection_answers: Json(IndexMap::new()),
        };

        let (record, revision) = row.into_record().unwrap();
        assert_eq!(revision, Revision(3));
        assert_eq!(record.status, SessionStatus::Ritual(1));
        assert_eq!(record.duration, Some(30));
        assert_eq!(record.ritual_answers["task"], "write");
    }

    #[test]
    fn test_corrupt_row_is_a_backend_error() {
        let row = SessionRow {
            chat_id: 42,
            revision: 1,
            phase: "ritual".into(),
            step_index: None,
            duration_minutes: None,
            timer_handle: None,
            ritual_answers: Json(IndexMap::new()),
            started_at: None,
            reflection_answers: Json(IndexMap::new()),
        };
        assert!(row.into_record().is_err());
    }
}
