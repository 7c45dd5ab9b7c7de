//! Durable destinations for finished sessions.

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::domains::pomodoro::models::CompletedSession;
use crate::domains::pomodoro::note::NoteFormatter;
use crate::kernel::BaseSessionSink;

// =============================================================================
// Markdown note files
// =============================================================================

/// Writes one markdown note per session into a directory.
///
/// The note is written to a hidden temporary file and renamed into place, so a
/// reader never sees a half-written note. Resubmitting a session overwrites it.
pub struct NoteFileSink {
    dir: PathBuf,
    formatter: NoteFormatter,
}

impl NoteFileSink {
    pub fn new(dir: impl Into<PathBuf>, formatter: NoteFormatter) -> Self {
        Self {
            dir: dir.into(),
            formatter,
        }
    }
}

#[async_trait]
impl BaseSessionSink for NoteFileSink {
    async fn commit(&self, session: &CompletedSession) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create notes dir {}", self.dir.display()))?;

        let file_name = self.formatter.file_name(session);
        let target = self.dir.join(&file_name);
        let tmp = self.dir.join(format!(".{}.tmp", Uuid::new_v4()));

        tokio::fs::write(&tmp, self.formatter.render(session))
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;

        if let Err(e) = tokio::fs::rename(&tmp, &target).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e).with_context(|| format!("Failed to move note to {}", target.display()));
        }

        info!(chat_id = %session.chat_id, file = %file_name, "Session note written");
        Ok(())
    }
}

// =============================================================================
// Ingestion table
// =============================================================================

/// Inserts the flat session payload into `pomodoro_ingestion` for downstream consumers.
#[derive(Clone)]
pub struct PostgresIngestionSink {
    pool: PgPool,
}

impl PostgresIngestionSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BaseSessionSink for PostgresIngestionSink {
    async fn commit(&self, session: &CompletedSession) -> Result<()> {
        let id = Uuid::new_v4();
        let payload = serde_json::to_string(&session.to_payload())?;

        sqlx::query(
            "INSERT INTO pomodoro_ingestion (id, chat_id, payload) VALUES ($1, $2, $3::json)",
        )
        .bind(id)
        .bind(session.chat_id.as_i64())
        .bind(payload)
        .execute(&self.pool)
        .await
        .context("Failed to insert ingestion row")?;

        info!(chat_id = %session.chat_id, ingestion_id = %id, "Session queued for ingestion");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ChatId;
    use crate::domains::pomodoro::script::StepScript;
    use chrono::{TimeZone, Utc};
    use indexmap::IndexMap;
    use std::sync::Arc;

    fn session() -> CompletedSession {
        let mut ritual = IndexMap::new();
        ritual.insert("task".to_string(), "write spec".to_string());
        CompletedSession {
            chat_id: ChatId(42),
            duration_minutes: Some(30),
            started_at: Some(Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()),
            ended_at: Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap(),
            ritual,
            reflection: IndexMap::new(),
        }
    }

    fn scratch_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("pomodoro-notes-{}-{}", name, Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_note_sink_writes_single_file_and_overwrites_on_retry() {
        let dir = scratch_dir("retry");
        let formatter = NoteFormatter::new(0, Arc::new(StepScript::compact())).unwrap();
        let sink = NoteFileSink::new(&dir, formatter);

        sink.commit(&session()).await.unwrap();
        sink.commit(&session()).await.unwrap();

        let mut entries = tokio::fs::read_dir(&dir).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        assert_eq!(names, vec!["2026-03-01 09-00 - write spec.md".to_string()]);

        let body = tokio::fs::read_to_string(dir.join(&names[0])).await.unwrap();
        assert!(body.contains("# write spec"));

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_note_sink_fails_when_dir_is_a_file() {
        let path = scratch_dir("blocked");
        tokio::fs::write(&path, b"not a dir").await.unwrap();
        let formatter = NoteFormatter::new(0, Arc::new(StepScript::compact())).unwrap();

        let result = NoteFileSink::new(&path, formatter).commit(&session()).await;

        assert!(result.is_err());
        tokio::fs::remove_file(&path).await.unwrap();
    }
}
