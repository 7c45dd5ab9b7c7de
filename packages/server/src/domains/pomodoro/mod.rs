//! Pomodoro domain - the chat-driven focus session ritual.
//!
//! ```text
//! InboundEvent → PomodoroService → PomodoroMachine::decide → Transition → effects
//! ```

pub mod commands;
pub mod events;
pub mod machine;
pub mod models;
pub mod note;
pub mod script;
pub mod service;

pub use commands::{NextRecord, OutboundMessage, PomodoroCommand, Transition};
pub use events::{InboundEvent, PomodoroEvent};
pub use machine::PomodoroMachine;
pub use models::{CompletedSession, SessionRecord, SessionStatus};
pub use note::NoteFormatter;
pub use script::{ScriptPreset, StepScript};
pub use service::PomodoroService;
