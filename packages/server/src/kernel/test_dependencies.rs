// TestDependencies - mock implementations for testing
//
// Provides in-memory collaborators that can be injected into ServerDeps for tests.
// Every mock is cheap to clone and clones share state, so a test can keep a handle
// to inspect calls after handing the mock to the service.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use super::deps::parse_telegram_update;
use super::{
    AllowlistGate, BaseChatGateway, BaseSessionSink, BaseSessionStore, BaseTimerGateway, Revision,
    ServerDeps, StoreError,
};
use crate::common::{ChatId, TimerHandle};
use crate::domains::pomodoro::events::InboundEvent;
use crate::domains::pomodoro::models::{CompletedSession, SessionRecord};
use crate::domains::pomodoro::script::Button;

// =============================================================================
// Mock Chat Gateway
// =============================================================================

/// A message captured by the mock chat gateway. `buttons` is empty for plain text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub chat_id: ChatId,
    pub text: String,
    pub buttons: Vec<Button>,
}

impl SentMessage {
    pub fn tokens(&self) -> Vec<&str> {
        self.buttons.iter().map(|b| b.token.as_str()).collect()
    }
}

/// Parses Telegram payloads like the real adapter, records everything it sends.
#[derive(Clone, Default)]
pub struct MockChatGateway {
    sent: Arc<Mutex<Vec<SentMessage>>>,
    acknowledged: Arc<Mutex<Vec<String>>>,
    fail_sends: Arc<AtomicBool>,
}

impl MockChatGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent().into_iter().map(|m| m.text).collect()
    }

    pub fn last_message(&self) -> Option<SentMessage> {
        self.sent.lock().unwrap().last().cloned()
    }

    pub fn acknowledged(&self) -> Vec<String> {
        self.acknowledged.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
        self.acknowledged.lock().unwrap().clear();
    }

    fn record(&self, chat_id: ChatId, text: &str, buttons: &[Button]) -> Result<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            anyhow::bail!("mock chat gateway: send failed");
        }
        self.sent.lock().unwrap().push(SentMessage {
            chat_id,
            text: text.to_string(),
            buttons: buttons.to_vec(),
        });
        Ok(())
    }
}

#[async_trait]
impl BaseChatGateway for MockChatGateway {
    fn parse_update(&self, raw: &str) -> Option<InboundEvent> {
        parse_telegram_update(raw)
    }

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<()> {
        self.record(chat_id, text, &[])
    }

    async fn send_choice(&self, chat_id: ChatId, text: &str, buttons: &[Button]) -> Result<()> {
        self.record(chat_id, text, buttons)
    }

    async fn acknowledge_choice(&self, choice_ref: &str) -> Result<()> {
        self.acknowledged
            .lock()
            .unwrap()
            .push(choice_ref.to_string());
        Ok(())
    }
}

// =============================================================================
// Mock Timer Gateway
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTimer {
    pub chat_id: ChatId,
    pub minutes: u32,
    pub handle: TimerHandle,
}

/// Hands out sequential handles (`timer-1`, `timer-2`, ...) and records cancels.
#[derive(Clone, Default)]
pub struct MockTimerGateway {
    next_id: Arc<AtomicU64>,
    scheduled: Arc<Mutex<Vec<ScheduledTimer>>>,
    cancelled: Arc<Mutex<Vec<TimerHandle>>>,
    fail_schedule: Arc<AtomicBool>,
    fail_cancel: Arc<AtomicBool>,
}

impl MockTimerGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_schedule(&self, fail: bool) {
        self.fail_schedule.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_cancel(&self, fail: bool) {
        self.fail_cancel.store(fail, Ordering::SeqCst);
    }

    pub fn scheduled(&self) -> Vec<ScheduledTimer> {
        self.scheduled.lock().unwrap().clone()
    }

    pub fn cancelled(&self) -> Vec<TimerHandle> {
        self.cancelled.lock().unwrap().clone()
    }
}

#[async_trait]
impl BaseTimerGateway for MockTimerGateway {
    async fn schedule(&self, chat_id: ChatId, minutes: u32) -> Result<TimerHandle> {
        if self.fail_schedule.load(Ordering::SeqCst) {
            anyhow::bail!("mock timer gateway: schedule failed");
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let handle = TimerHandle::new(format!("timer-{}", id));
        self.scheduled.lock().unwrap().push(ScheduledTimer {
            chat_id,
            minutes,
            handle: handle.clone(),
        });
        Ok(handle)
    }

    async fn cancel(&self, handle: &TimerHandle) -> Result<()> {
        if self.fail_cancel.load(Ordering::SeqCst) {
            anyhow::bail!("mock timer gateway: cancel failed");
        }
        self.cancelled.lock().unwrap().push(handle.clone());
        Ok(())
    }
}

// =============================================================================
// In-memory Session Store
// =============================================================================

/// Session store with the same revision compare-and-swap as the Postgres store.
#[derive(Clone, Default)]
pub struct InMemorySessionStore {
    records: Arc<Mutex<HashMap<ChatId, (SessionRecord, Revision)>>>,
    fail_writes: Arc<AtomicBool>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Current record for a chat, if one is stored.
    pub fn get(&self, chat_id: ChatId) -> Option<SessionRecord> {
        self.records
            .lock()
            .unwrap()
            .get(&chat_id)
            .map(|(record, _)| record.clone())
    }

    pub fn revision(&self, chat_id: ChatId) -> Revision {
        self.records
            .lock()
            .unwrap()
            .get(&chat_id)
            .map(|(_, revision)| *revision)
            .unwrap_or(Revision::NONE)
    }

    /// Seed a record directly, bypassing the machine.
    pub fn put(&self, record: SessionRecord) {
        let mut records = self.records.lock().unwrap();
        let revision = records
            .get(&record.chat_id)
            .map(|(_, r)| r.next())
            .unwrap_or(Revision(1));
        records.insert(record.chat_id, (record, revision));
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend(anyhow::anyhow!(
                "in-memory store: write failed"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl BaseSessionStore for InMemorySessionStore {
    async fn load(&self, chat_id: ChatId) -> Result<(SessionRecord, Revision), StoreError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(&chat_id)
            .cloned()
            .unwrap_or_else(|| (SessionRecord::idle(chat_id), Revision::NONE)))
    }

    async fn save(
        &self,
        record: &SessionRecord,
        expected: Revision,
    ) -> Result<Revision, StoreError> {
        self.check_writable()?;
        let mut records = self.records.lock().unwrap();
        let current = records
            .get(&record.chat_id)
            .map(|(_, r)| *r)
            .unwrap_or(Revision::NONE);
        if current != expected {
            return Err(StoreError::Conflict);
        }
        let next = expected.next();
        records.insert(record.chat_id, (record.clone(), next));
        Ok(next)
    }

    async fn delete(&self, chat_id: ChatId, expected: Revision) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut records = self.records.lock().unwrap();
        let current = records
            .get(&chat_id)
            .map(|(_, r)| *r)
            .unwrap_or(Revision::NONE);
        if current != expected {
            return Err(StoreError::Conflict);
        }
        records.remove(&chat_id);
        Ok(())
    }
}

// =============================================================================
// Mock Session Sink
// =============================================================================

#[derive(Clone, Default)]
pub struct MockSessionSink {
    committed: Arc<Mutex<Vec<CompletedSession>>>,
    failing: Arc<AtomicBool>,
}

impl MockSessionSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn committed(&self) -> Vec<CompletedSession> {
        self.committed.lock().unwrap().clone()
    }
}

#[async_trait]
impl BaseSessionSink for MockSessionSink {
    async fn commit(&self, session: &CompletedSession) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("mock sink: commit failed");
        }
        self.committed.lock().unwrap().push(session.clone());
        Ok(())
    }
}

// =============================================================================
// TestDependencies builder
// =============================================================================

pub struct TestDependencies {
    pub chat: MockChatGateway,
    pub timer: MockTimerGateway,
    pub store: InMemorySessionStore,
    pub sink: MockSessionSink,
    pub allowed: Vec<ChatId>,
}

impl TestDependencies {
    pub fn new() -> Self {
        Self {
            chat: MockChatGateway::new(),
            timer: MockTimerGateway::new(),
            store: InMemorySessionStore::new(),
            sink: MockSessionSink::new(),
            allowed: Vec::new(),
        }
    }

    pub fn allow(mut self, chat_id: ChatId) -> Self {
        self.allowed.push(chat_id);
        self
    }

    pub fn mock_chat(mut self, chat: MockChatGateway) -> Self {
        self.chat = chat;
        self
    }

    pub fn mock_timer(mut self, timer: MockTimerGateway) -> Self {
        self.timer = timer;
        self
    }

    pub fn mock_sink(mut self, sink: MockSessionSink) -> Self {
        self.sink = sink;
        self
    }

    /// Build `ServerDeps` sharing state with the mocks held here.
    pub fn to_deps(&self) -> Arc<ServerDeps> {
        Arc::new(ServerDeps::new(
            Arc::new(self.chat.clone()),
            Arc::new(self.timer.clone()),
            Arc::new(self.store.clone()),
            Arc::new(self.sink.clone()),
            Arc::new(AllowlistGate::new(self.allowed.iter().copied())),
        ))
    }
}

impl Default for TestDependencies {
    fn default() -> Self {
        Self::new()
    }
}
