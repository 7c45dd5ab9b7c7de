use axum::{extract::Extension, Json};
use serde_json::{json, Value};

use crate::server::app::AppState;

/// Telegram webhook. Always acknowledges with `{"ok": true}` so Telegram does not
/// redeliver; failures are handled and logged inside the service.
pub async fn telegram_webhook_handler(
    Extension(state): Extension<AppState>,
    body: String,
) -> Json<Value> {
    state.service.handle_update(&body).await;
    Json(json!({ "ok": true }))
}
