//! Markdown rendering of a completed session.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, Utc};
use indexmap::IndexMap;

use super::models::{CompletedSession, UNTITLED_SESSION};
use super::script::{Step, StepScript};

const TEMPLATE: &str = include_str!("../../../templates/session-note.md");
const MISSING: &str = "N/A";
const MAX_TITLE_CHARS: usize = 50;

#[derive(Debug, Clone)]
pub struct NoteFormatter {
    offset: FixedOffset,
    script: Arc<StepScript>,
}

impl NoteFormatter {
    pub fn new(utc_offset_hours: i32, script: Arc<StepScript>) -> Result<Self> {
        let offset = FixedOffset::east_opt(utc_offset_hours * 3600)
            .with_context(|| format!("Invalid UTC offset: {} hours", utc_offset_hours))?;
        Ok(Self { offset, script })
    }

    pub fn render(&self, session: &CompletedSession) -> String {
        let duration = session
            .duration_minutes
            .map(|m| format!("{} min", m))
            .unwrap_or_else(|| MISSING.to_string());

        fill_template(TEMPLATE, |name| match name {
            "date" => Some(self.format(session.started_at, "%Y-%m-%d")),
            "startTime" => Some(self.format(session.started_at, "%H:%M")),
            "stopTime" => Some(self.format(Some(session.ended_at), "%H:%M")),
            "duration" => Some(duration.clone()),
            "title" => Some(session.title().to_string()),
            "ritual" => Some(answer_lines(&self.script.ritual, &session.ritual)),
            "reflection" => Some(answer_lines(&self.script.reflection, &session.reflection)),
            _ => None,
        })
    }

    /// `YYYY-MM-DD HH-MM - <title>.md`, stamped with the start time so a resubmitted
    /// session lands on the same file.
    pub fn file_name(&self, session: &CompletedSession) -> String {
        let stamp = session
            .started_at
            .unwrap_or(session.ended_at)
            .with_timezone(&self.offset)
            .format("%Y-%m-%d %H-%M");
        format!("{} - {}.md", stamp, sanitize_title(session.title()))
    }

    fn format(&self, at: Option<DateTime<Utc>>, pattern: &str) -> String {
        at.map(|t| t.with_timezone(&self.offset).format(pattern).to_string())
            .unwrap_or_else(|| MISSING.to_string())
    }
}

/// One `**Label:** value` line per script step, then any answers the script no longer knows.
fn answer_lines(steps: &[Step], answers: &IndexMap<String, String>) -> String {
    let known = steps.iter().map(|step| {
        let value = answers
            .get(&step.field_key)
            .map(String::as_str)
            .unwrap_or(MISSING);
        format!("**{}:** {}", step.label, value)
    });
    let extra = answers
        .iter()
        .filter(|(key, _)| !steps.iter().any(|s| &s.field_key == *key))
        .map(|(key, value)| format!("**{}:** {}", key, value));

    known.chain(extra).collect::<Vec<_>>().join("\n")
}

/// Replace every `{{name}}` in one left-to-right pass. Substituted text is never
/// scanned again; unknown placeholders are kept verbatim.
fn fill_template(template: &str, value: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        match after.find("}}") {
            Some(close) => {
                let name = &after[..close];
                match value(name) {
                    Some(text) => out.push_str(&text),
                    None => {
                        out.push_str("{{");
                        out.push_str(name);
                        out.push_str("}}");
                    }
                }
                rest = &after[close + 2..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn sanitize_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == ' ')
        .take(MAX_TITLE_CHARS)
        .collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        UNTITLED_SESSION.to_string()
    } else {
        trimmed.to_string()
    }
}
