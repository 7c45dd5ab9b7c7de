//! Application setup and server configuration.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::Extension,
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use telegram::{TelegramOptions, TelegramService};
use tower_http::trace::TraceLayer;

use crate::config::{Config, SinkKind};
use crate::domains::pomodoro::note::NoteFormatter;
use crate::domains::pomodoro::script::StepScript;
use crate::domains::pomodoro::service::PomodoroService;
use crate::kernel::{
    AllowlistGate, BaseSessionSink, NoteFileSink, PostgresIngestionSink, PostgresSessionStore,
    PostgresTimerQueue, ServerDeps, TelegramAdapter,
};
use crate::server::routes::{health_handler, telegram_webhook_handler, timer_callback_handler};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub service: Arc<PomodoroService>,
}

/// Wire the production collaborators from configuration.
pub fn build_deps(config: &Config, pool: PgPool, script: Arc<StepScript>) -> Result<ServerDeps> {
    let telegram = Arc::new(
        TelegramService::new(TelegramOptions {
            bot_token: config.telegram_bot_token.clone(),
            api_base: config.telegram_api_base.clone(),
            request_timeout: config.telegram_timeout,
        })
        .context("Failed to build Telegram client")?,
    );

    let sink: Arc<dyn BaseSessionSink> = match config.sink {
        SinkKind::Notes => Arc::new(NoteFileSink::new(
            config.notes_dir.clone(),
            NoteFormatter::new(config.note_utc_offset_hours, script)?,
        )),
        SinkKind::Ingestion => Arc::new(PostgresIngestionSink::new(pool.clone())),
    };

    Ok(ServerDeps::new(
        Arc::new(TelegramAdapter::new(telegram)),
        Arc::new(PostgresTimerQueue::new(pool.clone())),
        Arc::new(PostgresSessionStore::new(pool)),
        sink,
        Arc::new(AllowlistGate::new(config.admin_chat_ids.iter().copied())),
    ))
}

/// Build the Axum application router.
///
/// Handlers always answer 200; outbound calls carry their own timeouts.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/telegram/webhook", post(telegram_webhook_handler))
        .route("/timer", post(timer_callback_handler))
        .route("/health", get(health_handler))
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
}
