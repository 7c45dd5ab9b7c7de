use anyhow::Result;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::common::{ChatId, TimerHandle};

/// Where a chat currently is in the ritual.
///
/// Ritual and reflection states are indices into the active script, so the set of
/// states follows the script instead of being hard-coded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "phase", content = "step", rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Idle,
    WaitingForDuration,
    Ritual(usize),
    Working,
    WaitingForExtension,
    Reflection(usize),
}

impl SessionStatus {
    /// Column values for the `phase` / `step_index` pair.
    pub fn to_parts(&self) -> (&'static str, Option<i32>) {
        match self {
            SessionStatus::Idle => ("idle", None),
            SessionStatus::WaitingForDuration => ("waiting_for_duration", None),
            SessionStatus::Ritual(i) => ("ritual", Some(*i as i32)),
            SessionStatus::Working => ("working", None),
            SessionStatus::WaitingForExtension => ("waiting_for_extension", None),
            SessionStatus::Reflection(i) => ("reflection", Some(*i as i32)),
        }
    }

    pub fn from_parts(phase: &str, step_index: Option<i32>) -> Result<Self> {
        let step = || -> Result<usize> {
            let raw = step_index
                .ok_or_else(|| anyhow::anyhow!("Phase '{}' requires a step index", phase))?;
            usize::try_from(raw).map_err(|_| anyhow::anyhow!("Invalid step index: {}", raw))
        };

        match phase {
            "idle" => Ok(SessionStatus::Idle),
            "waiting_for_duration" => Ok(SessionStatus::WaitingForDuration),
            "ritual" => Ok(SessionStatus::Ritual(step()?)),
            "working" => Ok(SessionStatus::Working),
            "waiting_for_extension" => Ok(SessionStatus::WaitingForExtension),
            "reflection" => Ok(SessionStatus::Reflection(step()?)),
            _ => Err(anyhow::anyhow!("Invalid session phase: {}", phase)),
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.to_parts() {
            (phase, Some(i)) => write!(f, "{}[{}]", phase, i),
            (phase, None) => write!(f, "{}", phase),
        }
    }
}

/// Persisted per-chat session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub chat_id: ChatId,
    pub status: SessionStatus,
    /// Originally chosen work length. Extensions never change it.
    pub duration: Option<u32>,
    /// Present only while a timer is outstanding.
    pub timer_handle: Option<TimerHandle>,
    pub ritual_answers: IndexMap<String, String>,
    /// Set when work starts, fixed across extensions.
    pub started_at: Option<DateTime<Utc>>,
    pub reflection_answers: IndexMap<String, String>,
}

impl SessionRecord {
    /// Fresh idle record with every optional field cleared.
    pub fn idle(chat_id: ChatId) -> Self {
        Self {
            chat_id,
            status: SessionStatus::Idle,
            duration: None,
            timer_handle: None,
            ritual_answers: IndexMap::new(),
            started_at: None,
            reflection_answers: IndexMap::new(),
        }
    }

    pub fn waiting_for_duration(chat_id: ChatId) -> Self {
        Self {
            status: SessionStatus::WaitingForDuration,
            ..Self::idle(chat_id)
        }
    }

    pub fn at(&self, status: SessionStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }

    pub fn with_duration(&self, minutes: u32) -> Self {
        Self {
            duration: Some(minutes),
            ..self.clone()
        }
    }

    /// Append a ritual answer. Callers check the key is absent first.
    pub fn with_ritual_answer(&self, key: &str, value: String) -> Self {
        let mut ritual_answers = self.ritual_answers.clone();
        ritual_answers.insert(key.to_string(), value);
        Self {
            ritual_answers,
            ..self.clone()
        }
    }

    pub fn with_reflection_answer(&self, key: &str, value: String) -> Self {
        let mut reflection_answers = self.reflection_answers.clone();
        reflection_answers.insert(key.to_string(), value);
        Self {
            reflection_answers,
            ..self.clone()
        }
    }

    /// Enter WORKING. `started_at` is only stamped the first time.
    pub fn working(&self, now: DateTime<Utc>) -> Self {
        Self {
            status: SessionStatus::Working,
            started_at: self.started_at.or(Some(now)),
            ..self.clone()
        }
    }

    pub fn with_timer(&self, handle: TimerHandle) -> Self {
        Self {
            timer_handle: Some(handle),
            ..self.clone()
        }
    }

    /// Leave WORKING for `status`, dropping the timer handle.
    pub fn timer_cleared(&self, status: SessionStatus) -> Self {
        Self {
            status,
            timer_handle: None,
            ..self.clone()
        }
    }

    pub fn has_answer(&self, key: &str) -> bool {
        self.ritual_answers.contains_key(key) || self.reflection_answers.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parts_round_trip_for_every_phase() {
        let all = [
            SessionStatus::Idle,
            SessionStatus::WaitingForDuration,
            SessionStatus::Ritual(3),
            SessionStatus::Working,
            SessionStatus::WaitingForExtension,
            SessionStatus::Reflection(0),
        ];
        for status in all {
            let (phase, step) = status.to_parts();
            assert_eq!(SessionStatus::from_parts(phase, step).unwrap(), status);
        }
    }

    #[test]
    fn test_from_parts_rejects_bad_rows() {
        assert!(SessionStatus::from_parts("ritual", None).is_err());
        assert!(SessionStatus::from_parts("reflection", Some(-1)).is_err());
        assert!(SessionStatus::from_parts("sleeping", None).is_err());
    }

    #[test]
    fn test_working_keeps_first_start_time() {
        let first = Utc::now();
        let record = SessionRecord::waiting_for_duration(ChatId(1)).working(first);
        let later = first + chrono::Duration::minutes(30);

        let resumed = record
            .timer_cleared(SessionStatus::WaitingForExtension)
            .working(later);

        assert_eq!(resumed.started_at, Some(first));
    }

    #[test]
    fn test_answers_keep_insertion_order() {
        let record = SessionRecord::idle(ChatId(1))
            .with_ritual_answer("task", "write".into())
            .with_ritual_answer("role", "engineer".into())
            .with_ritual_answer("product_type", "draft".into());

        let keys: Vec<_> = record.ritual_answers.keys().cloned().collect();
        assert_eq!(keys, vec!["task", "role", "product_type"]);
        assert!(record.has_answer("role"));
        assert!(!record.has_answer("outcome"));
    }

    #[test]
    fn test_status_serializes_with_step() {
        let json = serde_json::to_value(SessionStatus::Ritual(2)).unwrap();
        assert_eq!(json, serde_json::json!({"phase": "ritual", "step": 2}));
    }
}
