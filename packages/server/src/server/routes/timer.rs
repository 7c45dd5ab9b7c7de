use axum::{extract::Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::common::ChatId;
use crate::server::app::AppState;

pub const TIMER_DONE_ACTION: &str = "TIMER_DONE";

/// Callback body sent by external schedulers.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerCallback {
    pub action: String,
    pub chat_id: i64,
}

/// External scheduler callback: `{"action": "TIMER_DONE", "chatId": N}`.
///
/// Always answers `{"ok": true}`; malformed bodies are logged and dropped.
pub async fn timer_callback_handler(
    Extension(state): Extension<AppState>,
    body: String,
) -> Json<Value> {
    match serde_json::from_str::<TimerCallback>(&body) {
        Ok(callback) if callback.action == TIMER_DONE_ACTION => {
            state
                .service
                .handle_timer_fired(ChatId(callback.chat_id))
                .await;
        }
        Ok(callback) => warn!(action = %callback.action, "unknown timer action"),
        Err(e) => warn!(error = %e, "malformed timer callback"),
    }
    Json(json!({ "ok": true }))
}
