// Minimal Telegram Bot API client: send text, send inline keyboards, answer callbacks.
// https://core.telegram.org/bots/api

pub mod models;

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use thiserror::Error;

use crate::models::{
    AnswerCallbackQueryRequest, ApiResponse, InlineKeyboardButton, InlineKeyboardMarkup,
    SendMessageRequest,
};

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Upper bound for one Bot API call, connect through response body.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("request to Telegram failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Telegram returned {status}: {description}")]
    Api { status: u16, description: String },
}

#[derive(Debug, Clone)]
pub struct TelegramOptions {
    pub bot_token: String,
    pub api_base: String,
    pub request_timeout: Duration,
}

impl TelegramOptions {
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TelegramService {
    options: TelegramOptions,
    client: Client,
}

impl TelegramService {
    pub fn new(options: TelegramOptions) -> Result<Self, TelegramError> {
        let client = Client::builder()
            .timeout(options.request_timeout)
            .build()?;
        Ok(Self { options, client })
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{base}/bot{token}/{method}",
            base = self.options.api_base.trim_end_matches('/'),
            token = self.options.bot_token,
        )
    }

    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), TelegramError> {
        let payload = SendMessageRequest {
            chat_id,
            text,
            reply_markup: None,
        };
        self.call("sendMessage", &payload).await
    }

    /// Send a message with an inline keyboard. Buttons are `(label, callback_data)` pairs.
    pub async fn send_message_with_keyboard(
        &self,
        chat_id: i64,
        text: &str,
        buttons: &[(&str, &str)],
    ) -> Result<(), TelegramError> {
        let keyboard = InlineKeyboardMarkup::single_column(
            buttons
                .iter()
                .map(|(label, data)| InlineKeyboardButton {
                    text: label.to_string(),
                    callback_data: data.to_string(),
                })
                .collect(),
        );

        let payload = SendMessageRequest {
            chat_id,
            text,
            reply_markup: Some(keyboard),
        };
        self.call("sendMessage", &payload).await
    }

    /// Clears the loading indicator on the pressed button.
    pub async fn answer_callback_query(&self, callback_query_id: &str) -> Result<(), TelegramError> {
        let payload = AnswerCallbackQueryRequest { callback_query_id };
        self.call("answerCallbackQuery", &payload).await
    }

    async fn call<P: Serialize + ?Sized>(&self, method: &str, payload: &P) -> Result<(), TelegramError> {
        let response = self
            .client
            .post(self.method_url(method))
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let description = serde_json::from_str::<ApiResponse>(&body)
                .ok()
                .and_then(|r| r.description)
                .unwrap_or(body);
            tracing::warn!(method, status = status.as_u16(), %description, "Telegram API error");
            return Err(TelegramError::Api {
                status: status.as_u16(),
                description,
            });
        }

        let body = response.json::<ApiResponse>().await?;
        if !body.ok {
            return Err(TelegramError::Api {
                status: status.as_u16(),
                description: body.description.unwrap_or_default(),
            });
        }

        Ok(())
    }
}
