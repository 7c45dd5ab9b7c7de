//! Server dependencies for the pomodoro service (using traits for testability)
//!
//! This module provides the central dependency container. All external services use
//! trait abstractions so the flow can be exercised with in-memory doubles.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use telegram::models::Update;
use telegram::TelegramService;

use crate::common::ChatId;
use crate::domains::pomodoro::events::{InboundEvent, PomodoroEvent};
use crate::domains::pomodoro::script::Button;
use crate::kernel::{
    BaseAuthorizationGate, BaseChatGateway, BaseSessionSink, BaseSessionStore, BaseTimerGateway,
};

// =============================================================================
// TelegramService Adapter (implements BaseChatGateway trait)
// =============================================================================

/// Wrapper around TelegramService that implements BaseChatGateway trait
pub struct TelegramAdapter(pub Arc<TelegramService>);

impl TelegramAdapter {
    pub fn new(service: Arc<TelegramService>) -> Self {
        Self(service)
    }
}

#[async_trait]
impl BaseChatGateway for TelegramAdapter {
    fn parse_update(&self, raw: &str) -> Option<InboundEvent> {
        parse_telegram_update(raw)
    }

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<()> {
        self.0
            .send_message(chat_id.as_i64(), text)
            .await
            .map_err(|e| anyhow::anyhow!("{}", e))
    }

    async fn send_choice(&self, chat_id: ChatId, text: &str, buttons: &[Button]) -> Result<()> {
        let pairs: Vec<(&str, &str)> = buttons
            .iter()
            .map(|b| (b.label.as_str(), b.token.as_str()))
            .collect();
        self.0
            .send_message_with_keyboard(chat_id.as_i64(), text, &pairs)
            .await
            .map_err(|e| anyhow::anyhow!("{}", e))
    }

    async fn acknowledge_choice(&self, choice_ref: &str) -> Result<()> {
        self.0
            .answer_callback_query(choice_ref)
            .await
            .map_err(|e| anyhow::anyhow!("{}", e))
    }
}

/// Map a raw Telegram webhook body onto a pomodoro event.
///
/// `/start` (with optional `@bot` suffix or payload) restarts, `/stop` stops, other
/// commands are dropped, any other text is an answer. Callback data becomes a choice.
pub fn parse_telegram_update(raw: &str) -> Option<InboundEvent> {
    let update: Update = match serde_json::from_str(raw) {
        Ok(update) => update,
        Err(e) => {
            tracing::warn!(error = %e, "Malformed Telegram update");
            return None;
        }
    };

    if let Some(query) = update.callback_query {
        let token = query.data.clone()?;
        return Some(
            InboundEvent::new(ChatId(query.chat_id()), PomodoroEvent::Choice { token })
                .with_choice_ref(query.id),
        );
    }

    let message = update.message?;
    let text = message.text?;
    let chat_id = ChatId(message.chat.id);

    if let Some(command) = text.trim().strip_prefix('/') {
        let name = command
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .split('@')
            .next()
            .unwrap_or_default();
        return match name {
            "start" => Some(InboundEvent::new(chat_id, PomodoroEvent::Restart)),
            "stop" => Some(InboundEvent::new(chat_id, PomodoroEvent::Stop)),
            _ => None,
        };
    }

    Some(InboundEvent::new(chat_id, PomodoroEvent::Text { value: text }))
}

// =============================================================================
// ServerDeps
// =============================================================================

/// Server dependencies accessible to the pomodoro service (using traits for testability)
#[derive(Clone)]
pub struct ServerDeps {
    pub chat: Arc<dyn BaseChatGateway>,
    pub timer: Arc<dyn BaseTimerGateway>,
    pub session_store: Arc<dyn BaseSessionStore>,
    pub sink: Arc<dyn BaseSessionSink>,
    pub auth_gate: Arc<dyn BaseAuthorizationGate>,
}

impl ServerDeps {
    pub fn new(
        chat: Arc<dyn BaseChatGateway>,
        timer: Arc<dyn BaseTimerGateway>,
        session_store: Arc<dyn BaseSessionStore>,
        sink: Arc<dyn BaseSessionSink>,
        auth_gate: Arc<dyn BaseAuthorizationGate>,
    ) -> Self {
        Self {
            chat,
            timer,
            session_store,
            sink,
            auth_gate,
        }
    }
}
