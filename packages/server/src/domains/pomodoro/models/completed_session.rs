use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde_json::{Map, Value as JsonValue};

use crate::common::ChatId;

use super::session::SessionRecord;

pub const UNTITLED_SESSION: &str = "Untitled Session";

/// Keys the payload writes after the answers. An answer under one of these would be lost.
pub const PAYLOAD_METADATA_KEYS: [&str; 4] = ["duration", "startedAt", "endedAt", "chatId"];

/// Immutable snapshot handed to the sink when a session finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedSession {
    pub chat_id: ChatId,
    pub duration_minutes: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: DateTime<Utc>,
    pub ritual: IndexMap<String, String>,
    pub reflection: IndexMap<String, String>,
}

impl CompletedSession {
    pub fn from_record(record: &SessionRecord, ended_at: DateTime<Utc>) -> Self {
        Self {
            chat_id: record.chat_id,
            duration_minutes: record.duration,
            started_at: record.started_at,
            ended_at,
            ritual: record.ritual_answers.clone(),
            reflection: record.reflection_answers.clone(),
        }
    }

    /// Flat JSON object: every answer, then `duration`, `startedAt`, `endedAt`, `chatId`.
    pub fn to_payload(&self) -> JsonValue {
        let mut map = Map::new();
        for (key, value) in self.ritual.iter().chain(self.reflection.iter()) {
            map.insert(key.clone(), JsonValue::String(value.clone()));
        }
        map.insert(
            "duration".into(),
            self.duration_minutes
                .map(JsonValue::from)
                .unwrap_or(JsonValue::Null),
        );
        map.insert(
            "startedAt".into(),
            self.started_at
                .map(|t| JsonValue::String(t.to_rfc3339_opts(SecondsFormat::Millis, true)))
                .unwrap_or(JsonValue::Null),
        );
        map.insert(
            "endedAt".into(),
            JsonValue::String(self.ended_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        map.insert("chatId".into(), JsonValue::from(self.chat_id.as_i64()));
        JsonValue::Object(map)
    }

    /// The `task` answer, else the first ritual answer.
    pub fn title(&self) -> &str {
        self.ritual
            .get("task")
            .or_else(|| self.ritual.values().next())
            .map(String::as_str)
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(UNTITLED_SESSION)
    }
}
