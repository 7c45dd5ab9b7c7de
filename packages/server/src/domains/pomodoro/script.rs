//! Step script - the ordered questionnaire that drives the ritual and reflection phases.
//!
//! The machine is parametrized by a [`StepScript`] rather than hard-coding one state per
//! question, so adding or removing a question is a configuration change. States refer to
//! steps by index; the script supplies keys, prompts, buttons and display names.

use std::collections::HashSet;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

use super::events::PomodoroEvent;
use super::models::{SessionStatus, PAYLOAD_METADATA_KEYS};

/// Reserved token key for the work-interval length buttons.
pub const DURATION_KEY: &str = "duration";

/// Reserved token key for the finish-or-extend buttons.
pub const EXTENSION_KEY: &str = "extension";

/// Value of the extension token that ends the work interval.
pub const FINISH_VALUE: &str = "finish";

/// How a step accepts its answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// Only a press on one of the step's buttons counts.
    ChoiceOnly,
    /// Free text, or a button press if the step offers buttons.
    TextOrChoice,
}

/// A button offered to the user: visible label plus opaque `key:value` token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Button {
    pub label: String,
    pub token: String,
}

impl Button {
    pub fn new(label: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            token: token.into(),
        }
    }
}

/// One question of the ritual or reflection phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Display name of the state waiting for this step, e.g. `WAITING_FOR_TASK`.
    pub state_name: String,
    /// Key the answer is written under.
    pub field_key: String,
    /// Human label used when rendering the answer in a note.
    pub label: String,
    pub prompt: String,
    pub input_mode: InputMode,
    pub buttons: Vec<Button>,
}

impl Step {
    /// A free-text question.
    pub fn text(key: &str, label: &str, prompt: &str) -> Self {
        Self::build(key, label, prompt, InputMode::TextOrChoice, &[])
    }

    /// A question answered only by pressing one of `options` (`(label, value)` pairs).
    pub fn choice(key: &str, label: &str, prompt: &str, options: &[(&str, &str)]) -> Self {
        Self::build(key, label, prompt, InputMode::ChoiceOnly, options)
    }

    /// A question answered by a button press or by typing.
    pub fn text_or_choice(key: &str, label: &str, prompt: &str, options: &[(&str, &str)]) -> Self {
        Self::build(key, label, prompt, InputMode::TextOrChoice, options)
    }

    fn build(
        key: &str,
        label: &str,
        prompt: &str,
        input_mode: InputMode,
        options: &[(&str, &str)],
    ) -> Self {
        Self {
            state_name: format!("WAITING_FOR_{}", key.to_uppercase()),
            field_key: key.to_string(),
            label: label.to_string(),
            prompt: prompt.to_string(),
            input_mode,
            buttons: options
                .iter()
                .map(|(label, value)| Button::new(*label, format!("{}:{}", key, value)))
                .collect(),
        }
    }

    /// Extract this step's answer from an event, or `None` if the event is not a valid
    /// answer (wrong modality, foreign token, empty text).
    pub fn answer(&self, event: &PomodoroEvent) -> Option<String> {
        match event {
            PomodoroEvent::Choice { token } => {
                if !self.buttons.iter().any(|b| &b.token == token) {
                    return None;
                }
                token
                    .strip_prefix(self.field_key.as_str())
                    .and_then(|rest| rest.strip_prefix(':'))
                    .map(str::to_string)
            }
            PomodoroEvent::Text { value } => match self.input_mode {
                InputMode::TextOrChoice if !value.trim().is_empty() => Some(value.clone()),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Every user-facing sentence the bot sends outside of step prompts.
///
/// `{minutes}` is substituted where it appears.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptMessages {
    pub duration_prompt: String,
    pub duration_label: String,
    pub timer_started: String,
    pub time_up: String,
    pub stopped: String,
    pub finish_label: String,
    pub extension_label: String,
    pub extended: String,
    pub nothing_to_stop: String,
    pub saved: String,
    pub save_failed: String,
    pub timer_failed: String,
    pub internal_error: String,
}

impl Default for ScriptMessages {
    fn default() -> Self {
        Self {
            duration_prompt: "How long do you want to work?".into(),
            duration_label: "{minutes} min".into(),
            timer_started: "Timer started for {minutes} minutes. Focus!".into(),
            time_up: "Time's up. What next?".into(),
            stopped: "Session stopped. What next?".into(),
            finish_label: "Finish".into(),
            extension_label: "+{minutes} min".into(),
            extended: "Timer extended by {minutes} minutes. Back to work.".into(),
            nothing_to_stop: "No active session to stop.".into(),
            saved: "Session saved. Time to rest.".into(),
            save_failed: "Could not save the session. Send your last answer again to retry.".into(),
            timer_failed: "Could not start the timer. Please try again.".into(),
            internal_error: "Something went wrong. Please try again.".into(),
        }
    }
}

/// Substitute `{minutes}` in a message template.
pub fn with_minutes(template: &str, minutes: u32) -> String {
    template.replace("{minutes}", &minutes.to_string())
}

/// Script misconfiguration. Detected at startup, never at request time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("script offers no work durations")]
    NoDurations,

    #[error("{what} minutes must be positive")]
    ZeroMinutes { what: &'static str },

    #[error("step key must not be empty")]
    EmptyKey,

    #[error("step key '{0}' must not contain ':'")]
    KeyContainsSeparator(String),

    #[error("step key '{0}' is reserved")]
    ReservedKey(String),

    #[error("step key '{0}' is used more than once")]
    DuplicateKey(String),

    #[error("choice-only step '{0}' has no buttons")]
    ChoiceWithoutButtons(String),

    #[error("button token '{token}' does not belong to step '{key}'")]
    ForeignToken { key: String, token: String },
}

/// Which built-in script to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScriptPreset {
    #[default]
    Standard,
    Compact,
}

impl FromStr for ScriptPreset {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "standard" => Ok(ScriptPreset::Standard),
            "compact" => Ok(ScriptPreset::Compact),
            other => Err(anyhow::anyhow!("Invalid script preset: {}", other)),
        }
    }
}

/// The full ritual definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepScript {
    /// Work-interval lengths offered after `/start`.
    pub durations: Vec<u32>,
    /// Extension lengths offered when the timer elapses. Empty disables the extension
    /// decision: the session goes straight to reflection.
    pub extensions: Vec<u32>,
    pub ritual: Vec<Step>,
    pub reflection: Vec<Step>,
    pub messages: ScriptMessages,
}

impl StepScript {
    pub fn from_preset(preset: ScriptPreset) -> Self {
        match preset {
            ScriptPreset::Standard => Self::standard(),
            ScriptPreset::Compact => Self::compact(),
        }
    }

    /// Seven planning questions, five reflection questions with energy/focus/quality scoring.
    pub fn standard() -> Self {
        Self {
            durations: vec![5, 30, 45, 60, 90],
            extensions: vec![5, 10, 15, 20, 30],
            ritual: vec![
                Step::text(
                    "task",
                    "Task",
                    "What are you going to do? (One verb, describe the method)",
                ),
                role_step(),
                Step::text(
                    "product_type",
                    "Work product",
                    "What work product do you expect to get? (Draft, code, etc.)",
                ),
                Step::text(
                    "usage_context",
                    "Usage context",
                    "Where and under what conditions will this work product be used?",
                ),
                Step::text(
                    "work_context",
                    "Context",
                    "What is the context of this session? (Situation, reason, trigger)",
                ),
                Step::text("resources", "Resources", "What resources do you start with?"),
                Step::text("constraints", "Constraints", "Any constraints?"),
            ],
            reflection: vec![
                Step::choice(
                    "energy",
                    "Energy",
                    "What was your energy level?",
                    &[
                        ("5 - Peak", "5"),
                        ("4 - Flow", "4"),
                        ("3 - Functional", "3"),
                        ("2 - Declining", "2"),
                        ("1 - Exhausted", "1"),
                        ("0 - Critical", "0"),
                    ],
                ),
                Step::choice(
                    "focus",
                    "Focus",
                    "What was your focus level?",
                    &[("3 - Sharp", "3"), ("2 - Normal", "2"), ("1 - Scattered", "1")],
                ),
                Step::choice(
                    "quality",
                    "Quality",
                    "How good is the work product?",
                    &[
                        ("3 - Exceptional", "3"),
                        ("2 - Acceptable", "2"),
                        ("1 - Low", "1"),
                    ],
                ),
                Step::text("summary", "Summary", "Summarize the session briefly."),
                Step::text("next_step", "Next step", "What is the next step?"),
            ],
            messages: ScriptMessages::default(),
        }
    }

    /// Three planning questions and a single free-text outcome.
    pub fn compact() -> Self {
        Self {
            durations: vec![5, 30, 45, 60, 90],
            extensions: vec![5, 10, 15, 20, 30],
            ritual: vec![
                Step::text("task", "Task", "What are you working on?"),
                role_step(),
                Step::text(
                    "product_type",
                    "Work product",
                    "What work product do you expect to get?",
                ),
            ],
            reflection: vec![Step::text(
                "outcome",
                "Outcome",
                "Tell me what you have done.",
            )],
            messages: ScriptMessages::default(),
        }
    }

    /// Check the script for misconfiguration.
    pub fn validate(&self) -> Result<(), ScriptError> {
        if self.durations.is_empty() {
            return Err(ScriptError::NoDurations);
        }
        if self.durations.contains(&0) {
            return Err(ScriptError::ZeroMinutes { what: "duration" });
        }
        if self.extensions.contains(&0) {
            return Err(ScriptError::ZeroMinutes { what: "extension" });
        }

        let mut seen = HashSet::new();
        for step in self.ritual.iter().chain(self.reflection.iter()) {
            let key = step.field_key.as_str();
            if key.is_empty() {
                return Err(ScriptError::EmptyKey);
            }
            if key.contains(':') {
                return Err(ScriptError::KeyContainsSeparator(key.to_string()));
            }
            if key == DURATION_KEY
                || key == EXTENSION_KEY
                || PAYLOAD_METADATA_KEYS.contains(&key)
            {
                return Err(ScriptError::ReservedKey(key.to_string()));
            }
            if !seen.insert(key) {
                return Err(ScriptError::DuplicateKey(key.to_string()));
            }
            if step.input_mode == InputMode::ChoiceOnly && step.buttons.is_empty() {
                return Err(ScriptError::ChoiceWithoutButtons(key.to_string()));
            }
            let prefix = format!("{}:", key);
            if let Some(button) = step.buttons.iter().find(|b| !b.token.starts_with(&prefix)) {
                return Err(ScriptError::ForeignToken {
                    key: key.to_string(),
                    token: button.token.clone(),
                });
            }
        }

        Ok(())
    }

    pub fn duration_buttons(&self) -> Vec<Button> {
        self.durations
            .iter()
            .map(|m| {
                Button::new(
                    with_minutes(&self.messages.duration_label, *m),
                    format!("{}:{}", DURATION_KEY, m),
                )
            })
            .collect()
    }

    /// "Finish" first, then one button per extension length.
    pub fn extension_buttons(&self) -> Vec<Button> {
        std::iter::once(Button::new(
            self.messages.finish_label.clone(),
            format!("{}:{}", EXTENSION_KEY, FINISH_VALUE),
        ))
        .chain(self.extensions.iter().map(|m| {
            Button::new(
                with_minutes(&self.messages.extension_label, *m),
                format!("{}:{}", EXTENSION_KEY, m),
            )
        }))
        .collect()
    }

    /// Parse a `duration:N` token, accepting only offered lengths.
    pub fn parse_duration(&self, token: &str) -> Option<u32> {
        parse_minutes(token, DURATION_KEY, &self.durations)
    }

    /// Parse an `extension:N` token, accepting only offered lengths.
    pub fn parse_extension(&self, token: &str) -> Option<u32> {
        parse_minutes(token, EXTENSION_KEY, &self.extensions)
    }

    pub fn is_finish_token(&self, token: &str) -> bool {
        token
            .strip_prefix(EXTENSION_KEY)
            .and_then(|rest| rest.strip_prefix(':'))
            == Some(FINISH_VALUE)
    }

    /// Display name of a state under this script.
    pub fn state_name(&self, status: &SessionStatus) -> String {
        match status {
            SessionStatus::Idle => "IDLE".to_string(),
            SessionStatus::WaitingForDuration => "WAITING_FOR_DURATION".to_string(),
            SessionStatus::Ritual(i) => step_state_name(&self.ritual, *i),
            SessionStatus::Working => "WORKING".to_string(),
            SessionStatus::WaitingForExtension => "WAITING_FOR_EXTENSION".to_string(),
            SessionStatus::Reflection(i) => step_state_name(&self.reflection, *i),
        }
    }

    /// Note label for an answer key, falling back to the key itself.
    pub fn label_for<'a>(&'a self, key: &'a str) -> &'a str {
        self.ritual
            .iter()
            .chain(self.reflection.iter())
            .find(|s| s.field_key == key)
            .map(|s| s.label.as_str())
            .unwrap_or(key)
    }
}

fn role_step() -> Step {
    Step::text_or_choice(
        "role",
        "Role",
        "In which role will you do it?",
        &[
            ("Student", "student"),
            ("Intellectual", "intellectual"),
            ("Professional", "professional"),
            ("Researcher", "researcher"),
            ("Educator", "educator"),
        ],
    )
}

fn step_state_name(steps: &[Step], index: usize) -> String {
    steps
        .get(index)
        .map(|s| s.state_name.clone())
        .unwrap_or_else(|| format!("UNKNOWN_STEP_{}", index))
}

fn parse_minutes(token: &str, key: &str, offered: &[u32]) -> Option<u32> {
    let minutes = token
        .strip_prefix(key)?
        .strip_prefix(':')?
        .parse::<u32>()
        .ok()?;
    offered.contains(&minutes).then_some(minutes)
}
