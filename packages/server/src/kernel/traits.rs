// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// The session state machine lives in domains::pomodoro and talks to the outside world
// only through these traits.
//
// Naming convention: Base* for trait names (e.g., BaseChatGateway, BaseSessionStore)

use anyhow::Result;
use async_trait::async_trait;

use crate::common::{ChatId, TimerHandle};
use crate::domains::pomodoro::events::InboundEvent;
use crate::domains::pomodoro::models::{CompletedSession, SessionRecord};
use crate::domains::pomodoro::script::Button;
use crate::kernel::session_store::{Revision, StoreError};

// =============================================================================
// Chat Gateway Trait (Infrastructure - messaging platform)
// =============================================================================

#[async_trait]
pub trait BaseChatGateway: Send + Sync {
    /// Parse a raw inbound payload. `None` for payloads that carry no event
    /// (malformed JSON, unknown commands, stickers, ...).
    fn parse_update(&self, raw: &str) -> Option<InboundEvent>;

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<()>;

    /// Send a message with one button per row.
    async fn send_choice(&self, chat_id: ChatId, text: &str, buttons: &[Button]) -> Result<()>;

    /// Clear the pending indicator of a pressed button.
    async fn acknowledge_choice(&self, choice_ref: &str) -> Result<()>;
}

// =============================================================================
// Timer Gateway Trait (Infrastructure - fire-once callbacks)
// =============================================================================

#[async_trait]
pub trait BaseTimerGateway: Send + Sync {
    /// Arrange for a timer-fired event for `chat_id` after `minutes`.
    async fn schedule(&self, chat_id: ChatId, minutes: u32) -> Result<TimerHandle>;

    /// Cancel a pending timer. Unknown or already-fired handles are a no-op.
    async fn cancel(&self, handle: &TimerHandle) -> Result<()>;
}

// =============================================================================
// Session Store Trait (Infrastructure - per-chat state)
// =============================================================================

#[async_trait]
pub trait BaseSessionStore: Send + Sync {
    /// Load the record for a chat, or a fresh idle record at `Revision::NONE`.
    async fn load(&self, chat_id: ChatId) -> Result<(SessionRecord, Revision), StoreError>;

    /// Compare-and-swap save. Fails with `Conflict` if the stored revision moved.
    async fn save(&self, record: &SessionRecord, expected: Revision)
        -> Result<Revision, StoreError>;

    async fn delete(&self, chat_id: ChatId, expected: Revision) -> Result<(), StoreError>;
}

// =============================================================================
// Authorization Gate Trait
// =============================================================================

pub trait BaseAuthorizationGate: Send + Sync {
    fn is_authorized(&self, chat_id: ChatId) -> bool;
}

// =============================================================================
// Session Sink Trait (Infrastructure - durable destination for finished sessions)
// =============================================================================

#[async_trait]
pub trait BaseSessionSink: Send + Sync {
    /// All-or-nothing: on error nothing is considered written.
    async fn commit(&self, session: &CompletedSession) -> Result<()>;
}
