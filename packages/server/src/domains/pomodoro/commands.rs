//! Pomodoro commands - the side effects a transition asks for.
//!
//! The machine only describes them; `PomodoroService` executes them in a fixed order.

use crate::common::TimerHandle;

use super::models::{CompletedSession, SessionRecord};
use super::script::{Button, Step};

/// A chat message to send back to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    Text(String),
    Choice { text: String, buttons: Vec<Button> },
}

impl OutboundMessage {
    pub fn text(text: impl Into<String>) -> Self {
        OutboundMessage::Text(text.into())
    }

    /// A step's prompt, with its buttons when it has any.
    pub fn prompt(step: &Step) -> Self {
        if step.buttons.is_empty() {
            OutboundMessage::Text(step.prompt.clone())
        } else {
            OutboundMessage::Choice {
                text: step.prompt.clone(),
                buttons: step.buttons.clone(),
            }
        }
    }

    pub fn body(&self) -> &str {
        match self {
            OutboundMessage::Text(text) => text,
            OutboundMessage::Choice { text, .. } => text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PomodoroCommand {
    CancelTimer { handle: TimerHandle },
    /// The handle returned by the timer gateway is attached to the saved record.
    ScheduleTimer { minutes: u32 },
    CommitSession(CompletedSession),
    Send(OutboundMessage),
}

/// What happens to the stored record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextRecord {
    Unchanged,
    Save(SessionRecord),
    Delete,
}

/// Result of one `decide` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: NextRecord,
    pub commands: Vec<PomodoroCommand>,
}

impl Transition {
    /// No state change, no effects.
    pub fn ignored() -> Self {
        Self {
            next: NextRecord::Unchanged,
            commands: Vec::new(),
        }
    }

    pub fn save(record: SessionRecord, commands: Vec<PomodoroCommand>) -> Self {
        Self {
            next: NextRecord::Save(record),
            commands,
        }
    }

    pub fn is_ignored(&self) -> bool {
        self.next == NextRecord::Unchanged && self.commands.is_empty()
    }

    pub fn messages(&self) -> impl Iterator<Item = &OutboundMessage> {
        self.commands.iter().filter_map(|c| match c {
            PomodoroCommand::Send(message) => Some(message),
            _ => None,
        })
    }

    pub fn cancels(&self) -> impl Iterator<Item = &TimerHandle> {
        self.commands.iter().filter_map(|c| match c {
            PomodoroCommand::CancelTimer { handle } => Some(handle),
            _ => None,
        })
    }

    pub fn schedule(&self) -> Option<u32> {
        self.commands.iter().find_map(|c| match c {
            PomodoroCommand::ScheduleTimer { minutes } => Some(*minutes),
            _ => None,
        })
    }

    pub fn commit(&self) -> Option<&CompletedSession> {
        self.commands.iter().find_map(|c| match c {
            PomodoroCommand::CommitSession(session) => Some(session),
            _ => None,
        })
    }
}
