//! In-memory harness for driving the pomodoro service end to end.
//!
//! Inbound events go through the same Telegram payload parsing as production; the
//! collaborators are the mocks from `kernel::test_dependencies`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use pomodoro_core::common::ChatId;
use pomodoro_core::domains::pomodoro::models::SessionRecord;
use pomodoro_core::domains::pomodoro::script::{Step, StepScript};
use pomodoro_core::domains::pomodoro::PomodoroService;
use pomodoro_core::kernel::TestDependencies;

pub const CHAT: ChatId = ChatId(42);

/// Ritual [task (text), role (choice)], reflection [outcome (text)].
pub fn test_script() -> StepScript {
    StepScript {
        durations: vec![5, 30, 45],
        extensions: vec![5, 10, 15],
        ritual: vec![
            Step::text("task", "Task", "What will you do?"),
            Step::choice(
                "role",
                "Role",
                "Which role?",
                &[("Engineer", "engineer"), ("Writer", "writer")],
            ),
        ],
        reflection: vec![Step::text("outcome", "Outcome", "What did you do?")],
        messages: Default::default(),
    }
}

pub struct PomodoroHarness {
    pub deps: TestDependencies,
    pub service: PomodoroService,
    next_update: AtomicU64,
}

impl PomodoroHarness {
    pub fn new() -> Self {
        Self::with_script(test_script())
    }

    pub fn with_script(script: StepScript) -> Self {
        script.validate().expect("test script must be valid");
        let deps = TestDependencies::new().allow(CHAT);
        let service = PomodoroService::new(deps.to_deps(), Arc::new(script));
        Self {
            deps,
            service,
            next_update: AtomicU64::new(1),
        }
    }

    fn update_id(&self) -> u64 {
        self.next_update.fetch_add(1, Ordering::SeqCst)
    }

    pub fn text_update(&self, chat: ChatId, text: &str) -> String {
        serde_json::json!({
            "update_id": self.update_id(),
            "message": {"message_id": 1, "chat": {"id": chat.as_i64()}, "text": text}
        })
        .to_string()
    }

    pub fn callback_update(&self, chat: ChatId, token: &str) -> String {
        let id = self.update_id();
        serde_json::json!({
            "update_id": id,
            "callback_query": {
                "id": format!("cb-{}", id),
                "from": {"id": chat.as_i64()},
                "message": {"message_id": 1, "chat": {"id": chat.as_i64()}},
                "data": token
            }
        })
        .to_string()
    }

    pub async fn say(&self, text: &str) {
        self.service
            .handle_update(&self.text_update(CHAT, text))
            .await;
    }

    pub async fn press(&self, token: &str) {
        self.service
            .handle_update(&self.callback_update(CHAT, token))
            .await;
    }

    pub async fn timer_fired(&self) {
        self.service.handle_timer_fired(CHAT).await;
    }

    pub fn record(&self) -> Option<SessionRecord> {
        self.deps.store.get(CHAT)
    }

    /// Drive `/start`, a 30 minute duration and both ritual answers.
    pub async fn start_working(&self) {
        self.say("/start").await;
        self.press("duration:30").await;
        self.say("write spec").await;
        self.press("role:engineer").await;
    }
}

impl Default for PomodoroHarness {
    fn default() -> Self {
        Self::new()
    }
}
