use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::common::ChatId;
use crate::domains::pomodoro::script::ScriptPreset;

/// Where finished sessions go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SinkKind {
    /// Markdown note files in `NOTES_DIR`.
    #[default]
    Notes,
    /// Rows in the `pomodoro_ingestion` table.
    Ingestion,
}

impl FromStr for SinkKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "notes" => Ok(SinkKind::Notes),
            "ingestion" => Ok(SinkKind::Ingestion),
            other => Err(anyhow::anyhow!("Invalid session sink: {}", other)),
        }
    }
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub telegram_bot_token: String,
    pub telegram_api_base: String,
    pub telegram_timeout: Duration,
    pub admin_chat_ids: Vec<ChatId>,
    pub script: ScriptPreset,
    pub sink: SinkKind,
    pub notes_dir: PathBuf,
    pub note_utc_offset_hours: i32,
    pub timer_poll_interval: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            telegram_bot_token: env::var("TELEGRAM_BOT_TOKEN")
                .context("TELEGRAM_BOT_TOKEN must be set")?,
            telegram_api_base: env::var("TELEGRAM_API_BASE")
                .unwrap_or_else(|_| telegram::DEFAULT_API_BASE.to_string()),
            telegram_timeout: Duration::from_secs(
                env::var("TELEGRAM_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .context("TELEGRAM_TIMEOUT_SECS must be a valid number")?,
            ),
            admin_chat_ids: parse_chat_ids(
                &env::var("ADMIN_CHAT_IDS").context("ADMIN_CHAT_IDS must be set")?,
            )
            .context("ADMIN_CHAT_IDS must be a comma-separated list of chat ids")?,
            script: env::var("POMODORO_SCRIPT")
                .unwrap_or_else(|_| "standard".to_string())
                .parse()
                .context("POMODORO_SCRIPT must be 'standard' or 'compact'")?,
            sink: env::var("SESSION_SINK")
                .unwrap_or_else(|_| "notes".to_string())
                .parse()
                .context("SESSION_SINK must be 'notes' or 'ingestion'")?,
            notes_dir: env::var("NOTES_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./notes")),
            note_utc_offset_hours: env::var("NOTE_UTC_OFFSET_HOURS")
                .unwrap_or_else(|_| "4".to_string())
                .parse()
                .context("NOTE_UTC_OFFSET_HOURS must be a whole number of hours")?,
            timer_poll_interval: Duration::from_secs(
                env::var("TIMER_POLL_INTERVAL_SECS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .context("TIMER_POLL_INTERVAL_SECS must be a valid number")?,
            ),
        })
    }
}

/// Parse `"1, -100200, 3"` into chat ids. Blank entries are skipped.
pub fn parse_chat_ids(raw: &str) -> Result<Vec<ChatId>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ChatId::from_str)
        .collect()
}
