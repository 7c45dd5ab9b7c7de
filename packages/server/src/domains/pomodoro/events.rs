use crate::common::ChatId;

/// One inbound event, already stripped of transport details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PomodoroEvent {
    /// `/start` - abandon whatever is in progress and begin a new session.
    Restart,
    /// `/stop` - end the work interval early.
    Stop,
    /// A button press carrying its `key:value` token.
    Choice { token: String },
    /// Free text, stored verbatim.
    Text { value: String },
    /// The scheduler reports that the work timer elapsed.
    TimerFired,
}

impl PomodoroEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            PomodoroEvent::Restart => "restart",
            PomodoroEvent::Stop => "stop",
            PomodoroEvent::Choice { .. } => "choice",
            PomodoroEvent::Text { .. } => "text",
            PomodoroEvent::TimerFired => "timer_fired",
        }
    }
}

/// A parsed inbound event together with who sent it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub chat_id: ChatId,
    pub event: PomodoroEvent,
    /// Transport reference to acknowledge for button presses (Telegram callback query id).
    pub choice_ref: Option<String>,
}

impl InboundEvent {
    pub fn new(chat_id: ChatId, event: PomodoroEvent) -> Self {
        Self {
            chat_id,
            event,
            choice_ref: None,
        }
    }

    pub fn with_choice_ref(mut self, choice_ref: impl Into<String>) -> Self {
        self.choice_ref = Some(choice_ref.into());
        self
    }
}
