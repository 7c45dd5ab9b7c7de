//! Postgres-backed store, timer queue and ingestion sink.
//!
//! These need Docker for the shared container; run with `cargo test -- --ignored`.

mod common;

use chrono::{TimeZone, Utc};
use pomodoro_core::common::{ChatId, TimerHandle};
use pomodoro_core::domains::pomodoro::models::{CompletedSession, SessionRecord, SessionStatus};
use pomodoro_core::kernel::jobs::TimerQueue;
use pomodoro_core::kernel::{
    BaseSessionSink, BaseSessionStore, BaseTimerGateway, PostgresIngestionSink,
    PostgresSessionStore, PostgresTimerQueue, Revision, StoreError,
};
use uuid::Uuid;

use crate::common::test_pool;

fn ritual_record(chat_id: ChatId) -> SessionRecord {
    SessionRecord::waiting_for_duration(chat_id)
        .with_duration(45)
        .with_ritual_answer("task", "write spec".into())
        .with_ritual_answer("role", "engineer".into())
        .with_ritual_answer("energy", "high".into())
        .at(SessionStatus::Ritual(3))
}

// ============================================================================
// Session store
// ============================================================================

#[tokio::test]
#[ignore] // Requires Docker
async fn missing_row_loads_as_idle() {
    let store = PostgresSessionStore::new(test_pool().await);

    let (record, revision) = store.load(ChatId(1001)).await.unwrap();

    assert_eq!(record, SessionRecord::idle(ChatId(1001)));
    assert_eq!(revision, Revision::NONE);
}

#[tokio::test]
#[ignore] // Requires Docker
async fn save_round_trips_record_and_answer_order() {
    let store = PostgresSessionStore::new(test_pool().await);
    let chat = ChatId(1002);
    let started_at = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
    let record = ritual_record(chat)
        .working(started_at)
        .with_timer(TimerHandle::new("timer-abc"));

    let revision = store.save(&record, Revision::NONE).await.unwrap();
    let (loaded, loaded_revision) = store.load(chat).await.unwrap();

    assert_eq!(loaded, record);
    assert_eq!(loaded_revision, revision);
    let keys: Vec<&str> = loaded.ritual_answers.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["task", "role", "energy"]);
}

#[tokio::test]
#[ignore] // Requires Docker
async fn stale_revision_is_a_conflict() {
    let store = PostgresSessionStore::new(test_pool().await);
    let chat = ChatId(1003);

    let first = store
        .save(&SessionRecord::waiting_for_duration(chat), Revision::NONE)
        .await
        .unwrap();
    let second = store.save(&ritual_record(chat), first).await.unwrap();
    assert!(second.value() > first.value());

    let stale = store
        .save(&SessionRecord::waiting_for_duration(chat), first)
        .await;
    assert!(matches!(stale, Err(StoreError::Conflict)));

    let duplicate_insert = store
        .save(&SessionRecord::waiting_for_duration(chat), Revision::NONE)
        .await;
    assert!(matches!(duplicate_insert, Err(StoreError::Conflict)));

    let (loaded, _) = store.load(chat).await.unwrap();
    assert_eq!(loaded.status, SessionStatus::Ritual(3));
}

#[tokio::test]
#[ignore] // Requires Docker
async fn delete_checks_revision_and_resets_to_idle() {
    let store = PostgresSessionStore::new(test_pool().await);
    let chat = ChatId(1004);
    let revision = store
        .save(&ritual_record(chat), Revision::NONE)
        .await
        .unwrap();

    assert!(matches!(
        store.delete(chat, revision.next()).await,
        Err(StoreError::Conflict)
    ));

    store.delete(chat, revision).await.unwrap();
    let (record, after) = store.load(chat).await.unwrap();
    assert_eq!(record.status, SessionStatus::Idle);
    assert_eq!(after, Revision::NONE);
}

// ============================================================================
// Timer queue
// ============================================================================

#[tokio::test]
#[ignore] // Requires Docker
async fn due_timer_is_claimed_once_and_marked_fired() {
    let queue = PostgresTimerQueue::new(test_pool().await);
    let chat = ChatId(2001);

    let handle = queue.schedule(chat, 0).await.unwrap();
    let id = Uuid::parse_str(handle.as_str()).unwrap();

    let claimed = queue.claim_due("worker-a", 100).await.unwrap();
    assert!(claimed.iter().any(|t| t.id == id && t.chat_id == chat));

    let again = queue.claim_due("worker-b", 100).await.unwrap();
    assert!(again.iter().all(|t| t.id != id));

    queue.mark_fired(id).await.unwrap();
    // Cancelling a fired timer is a no-op.
    queue.cancel(&handle).await.unwrap();
}

#[tokio::test]
#[ignore] // Requires Docker
async fn cancelled_timer_is_never_claimed() {
    let pool = test_pool().await;
    let queue = PostgresTimerQueue::new(pool.clone());

    let handle = queue.schedule(ChatId(2002), 0).await.unwrap();
    queue.cancel(&handle).await.unwrap();

    let id = Uuid::parse_str(handle.as_str()).unwrap();
    let claimed = queue.claim_due("worker-a", 100).await.unwrap();
    assert!(claimed.iter().all(|t| t.id != id));

    let status: String = sqlx::query_scalar("SELECT status FROM pomodoro_timers WHERE id = $1")
        .bind(id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(status, "cancelled");
}

#[tokio::test]
#[ignore] // Requires Docker
async fn expired_lease_is_reclaimed() {
    let queue = PostgresTimerQueue::new(test_pool().await).with_lease_ms(0);

    let handle = queue.schedule(ChatId(2003), 0).await.unwrap();
    let id = Uuid::parse_str(handle.as_str()).unwrap();

    let first = queue.claim_due("worker-a", 100).await.unwrap();
    assert!(first.iter().any(|t| t.id == id));

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let second = queue.claim_due("worker-b", 100).await.unwrap();
    assert!(second.iter().any(|t| t.id == id));

    queue.mark_fired(id).await.unwrap();
}

#[tokio::test]
#[ignore] // Requires Docker
async fn foreign_handle_cancel_is_ignored() {
    let queue = PostgresTimerQueue::new(test_pool().await);

    queue
        .cancel(&TimerHandle::new("not-a-uuid"))
        .await
        .unwrap();
}

// ============================================================================
// Ingestion sink
// ============================================================================

#[tokio::test]
#[ignore] // Requires Docker
async fn ingestion_sink_stores_flat_payload() {
    let pool = test_pool().await;
    let sink = PostgresIngestionSink::new(pool.clone());
    let chat = ChatId(3001);
    let record = ritual_record(chat)
        .working(Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap())
        .with_reflection_answer("outcome", "done".into());
    let session =
        CompletedSession::from_record(&record, Utc.with_ymd_and_hms(2026, 3, 1, 9, 45, 0).unwrap());

    sink.commit(&session).await.unwrap();

    let payload: String =
        sqlx::query_scalar("SELECT payload::text FROM pomodoro_ingestion WHERE chat_id = $1")
            .bind(chat.as_i64())
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(
        payload,
        r#"{"task":"write spec","role":"engineer","energy":"high","outcome":"done","duration":45,"startedAt":"2026-03-01T09:00:00.000Z","endedAt":"2026-03-01T09:45:00.000Z","chatId":3001}"#
    );
}
