//! Pomodoro service - glue between the pure machine and the outside world.
//!
//! One inbound event is one load / decide / apply cycle. Effects are applied in a
//! fixed order so that a failure part way through never leaves a half-applied
//! transition:
//!
//! 1. commit the finished session to the sink
//! 2. schedule the new timer
//! 3. persist (compare-and-swap save, or delete)
//! 4. cancel timers the old record held
//! 5. send chat messages
//!
//! Cancels run only once the new record is stored. A cancel that fails after that
//! leaves a stray timer, which the machine ignores outside WORKING.
//!
//! Entry points never return errors; everything is logged and the user gets a
//! plain-language message where one makes sense.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::common::{ChatId, TimerHandle};
use crate::kernel::{Revision, ServerDeps, StoreError, TimerFiredHandler};

use super::commands::{NextRecord, OutboundMessage, Transition};
use super::events::PomodoroEvent;
use super::machine::PomodoroMachine;
use super::models::SessionStatus;
use super::script::StepScript;

#[derive(Clone)]
pub struct PomodoroService {
    deps: Arc<ServerDeps>,
    machine: PomodoroMachine,
}

impl PomodoroService {
    pub fn new(deps: Arc<ServerDeps>, script: Arc<StepScript>) -> Self {
        Self {
            deps,
            machine: PomodoroMachine::new(script),
        }
    }

    pub fn script(&self) -> &StepScript {
        self.machine.script()
    }

    /// Webhook entry point: raw chat platform payload.
    pub async fn handle_update(&self, raw: &str) {
        let Some(inbound) = self.deps.chat.parse_update(raw) else {
            debug!("update carries no pomodoro event");
            return;
        };

        if !self.deps.auth_gate.is_authorized(inbound.chat_id) {
            warn!(chat_id = %inbound.chat_id, "unauthorized chat, dropping update");
            return;
        }

        if let Some(choice_ref) = &inbound.choice_ref {
            if let Err(e) = self.deps.chat.acknowledge_choice(choice_ref).await {
                warn!(chat_id = %inbound.chat_id, error = %e, "failed to acknowledge button press");
            }
        }

        self.process(inbound.chat_id, inbound.event).await;
    }

    /// Scheduler entry point: the work timer for `chat_id` elapsed.
    pub async fn handle_timer_fired(&self, chat_id: ChatId) {
        if !self.deps.auth_gate.is_authorized(chat_id) {
            warn!(chat_id = %chat_id, "unauthorized chat, dropping timer callback");
            return;
        }

        self.process(chat_id, PomodoroEvent::TimerFired).await;
    }

    async fn process(&self, chat_id: ChatId, event: PomodoroEvent) {
        let (record, revision) = match self.deps.session_store.load(chat_id).await {
            Ok(loaded) => loaded,
            Err(e) => {
                error!(chat_id = %chat_id, error = %e, "failed to load session");
                self.notify(chat_id, &self.script().messages.internal_error)
                    .await;
                return;
            }
        };

        let transition = self.machine.decide(&record, &event, Utc::now());
        let from = self.script().state_name(&record.status);

        if transition.is_ignored() {
            debug!(chat_id = %chat_id, state = %from, event = event.kind(), "event ignored in current state");
            return;
        }

        let to = match &transition.next {
            NextRecord::Save(next) => self.script().state_name(&next.status),
            NextRecord::Delete => self.script().state_name(&SessionStatus::Idle),
            NextRecord::Unchanged => from.clone(),
        };
        debug!(chat_id = %chat_id, from = %from, to = %to, event = event.kind(), revision = %revision, "applying transition");

        if self.apply(chat_id, &transition, revision).await {
            info!(chat_id = %chat_id, from = %from, to = %to, "session transition");
        }
    }

    /// Returns true when the transition was fully applied.
    async fn apply(
        &self,
        chat_id: ChatId,
        transition: &Transition,
        revision: Revision,
    ) -> bool {
        let messages = &self.script().messages;

        if let Some(session) = transition.commit() {
            if let Err(e) = self.deps.sink.commit(session).await {
                error!(chat_id = %chat_id, error = %e, "failed to commit completed session");
                self.notify(chat_id, &messages.save_failed).await;
                return false;
            }
            info!(chat_id = %chat_id, "completed session committed");
        }

        let scheduled: Option<TimerHandle> = match transition.schedule() {
            Some(minutes) => match self.deps.timer.schedule(chat_id, minutes).await {
                Ok(handle) => {
                    debug!(chat_id = %chat_id, timer = %handle, minutes, "timer scheduled");
                    Some(handle)
                }
                Err(e) => {
                    error!(chat_id = %chat_id, minutes, error = %e, "failed to schedule timer");
                    self.notify(chat_id, &messages.timer_failed).await;
                    return false;
                }
            },
            None => None,
        };

        let persisted = match &transition.next {
            NextRecord::Unchanged => Ok(()),
            NextRecord::Save(next) => {
                let next = match &scheduled {
                    Some(handle) => next.with_timer(handle.clone()),
                    None => next.clone(),
                };
                self.deps
                    .session_store
                    .save(&next, revision)
                    .await
                    .map(|_| ())
            }
            NextRecord::Delete => self.deps.session_store.delete(chat_id, revision).await,
        };

        if let Err(e) = persisted {
            if let Some(handle) = &scheduled {
                if let Err(cancel_err) = self.deps.timer.cancel(handle).await {
                    error!(chat_id = %chat_id, timer = %handle, error = %cancel_err, "failed to cancel orphaned timer");
                }
            }
            match e {
                StoreError::Conflict => {
                    warn!(chat_id = %chat_id, "session changed concurrently, dropping event");
                }
                StoreError::Backend(e) => {
                    error!(chat_id = %chat_id, error = %e, "failed to persist session");
                    self.notify(chat_id, &messages.internal_error).await;
                }
            }
            return false;
        }

        for handle in transition.cancels() {
            if let Err(e) = self.deps.timer.cancel(handle).await {
                warn!(chat_id = %chat_id, timer = %handle, error = %e, "failed to cancel timer, it will fire into a later state");
            }
        }

        for message in transition.messages() {
            self.send(chat_id, message).await;
        }

        true
    }

    async fn send(&self, chat_id: ChatId, message: &OutboundMessage) {
        let result = match message {
            OutboundMessage::Text(text) => self.deps.chat.send_text(chat_id, text).await,
            OutboundMessage::Choice { text, buttons } => {
                self.deps.chat.send_choice(chat_id, text, buttons).await
            }
        };
        if let Err(e) = result {
            error!(chat_id = %chat_id, error = %e, "failed to send message");
        }
    }

    async fn notify(&self, chat_id: ChatId, text: &str) {
        if let Err(e) = self.deps.chat.send_text(chat_id, text).await {
            error!(chat_id = %chat_id, error = %e, "failed to send failure notice");
        }
    }
}

#[async_trait]
impl TimerFiredHandler for PomodoroService {
    async fn on_timer_fired(&self, chat_id: ChatId) {
        self.handle_timer_fired(chat_id).await;
    }
}
