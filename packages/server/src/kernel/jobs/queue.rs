//! PostgreSQL-backed fire-once timer queue.
//!
//! A timer is a row in `pomodoro_timers`; its UUID is the handle stored on the session.
//! Claiming uses `FOR UPDATE SKIP LOCKED` with a lease, so several runners can poll the
//! same table and a runner that dies mid-delivery releases its claims when the lease runs out.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::common::{ChatId, TimerHandle};
use crate::kernel::BaseTimerGateway;

/// A due timer claimed by one runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedTimer {
    pub id: Uuid,
    pub chat_id: ChatId,
}

/// Queue operations the runner needs.
#[async_trait]
pub trait TimerQueue: Send + Sync {
    /// Claim up to `limit` due timers (or timers whose lease expired).
    async fn claim_due(&self, worker_id: &str, limit: i64) -> Result<Vec<ClaimedTimer>>;

    async fn mark_fired(&self, id: Uuid) -> Result<()>;
}

#[derive(Clone)]
pub struct PostgresTimerQueue {
    pool: PgPool,
    lease_ms: i64,
}

impl PostgresTimerQueue {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lease_ms: 60_000,
        }
    }

    pub fn with_lease_ms(mut self, lease_ms: i64) -> Self {
        self.lease_ms = lease_ms;
        self
    }
}

#[async_trait]
impl BaseTimerGateway for PostgresTimerQueue {
    async fn schedule(&self, chat_id: ChatId, minutes: u32) -> Result<TimerHandle> {
        let id = Uuid::new_v4();
        let fire_at = Utc::now() + Duration::minutes(i64::from(minutes));

        sqlx::query(
            r#"
            INSERT INTO pomodoro_timers (id, chat_id, fire_at, status)
            VALUES ($1, $2, $3, 'pending')
            "#,
        )
        .bind(id)
        .bind(chat_id.as_i64())
        .bind(fire_at)
        .execute(&self.pool)
        .await?;

        debug!(timer_id = %id, chat_id = %chat_id, %fire_at, "timer scheduled");
        Ok(TimerHandle::new(id.to_string()))
    }

    async fn cancel(&self, handle: &TimerHandle) -> Result<()> {
        let Ok(id) = Uuid::parse_str(handle.as_str()) else {
            debug!(handle = %handle, "ignoring cancel for foreign timer handle");
            return Ok(());
        };

        let result = sqlx::query(
            r#"
            UPDATE pomodoro_timers
            SET status = 'cancelled', updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        debug!(timer_id = %id, cancelled = result.rows_affected() > 0, "timer cancel");
        Ok(())
    }
}

#[async_trait]
impl TimerQueue for PostgresTimerQueue {
    async fn claim_due(&self, worker_id: &str, limit: i64) -> Result<Vec<ClaimedTimer>> {
        let rows = sqlx::query_as::<_, (Uuid, i64)>(
            r#"
            WITH due AS (
                SELECT id
                FROM pomodoro_timers
                WHERE
                    (status = 'pending' AND fire_at <= NOW())
                    OR (status = 'running' AND lease_expires_at < NOW())
                ORDER BY fire_at
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE pomodoro_timers
            SET
                status = 'running',
                worker_id = $2,
                lease_expires_at = NOW() + ($3 || ' milliseconds')::INTERVAL,
                updated_at = NOW()
            WHERE id IN (SELECT id FROM due)
            RETURNING id, chat_id
            "#,
        )
        .bind(limit)
        .bind(worker_id)
        .bind(self.lease_ms.to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, chat_id)| ClaimedTimer {
                id,
                chat_id: ChatId(chat_id),
            })
            .collect())
    }

    async fn mark_fired(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE pomodoro_timers
            SET status = 'fired', lease_expires_at = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
