use crate::notify::Notifier;
use anyhow::{Context, Result};
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::ChatId;
use thiserror::Error;

const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Telegram API error: {0}")]
    ApiError(String),

    #[error("Invalid API URL: {0}")]
    InvalidApiUrl(String),
}

/// Sends supervisor events to an operator chat through the Bot API.
pub struct TelegramNotifier {
    bot: Bot,
    chat_id: ChatId,
}

impl TelegramNotifier {
    pub fn new(token: String, chat_id: i64) -> Self {
        Self {
            bot: Bot::new(token),
            chat_id: ChatId(chat_id),
        }
    }

    /// Same as [`TelegramNotifier::new`] over a caller-built HTTP client.
    pub fn with_client(token: String, chat_id: i64, client: reqwest::Client) -> Self {
        Self {
            bot: Bot::with_client(token, client),
            chat_id: ChatId(chat_id),
        }
    }

    /// Points the bot at a non-default Bot API server (self-hosted or test).
    pub fn with_api_url(mut self, api_url: &str) -> Result<Self> {
        let url = reqwest::Url::parse(api_url)
            .map_err(|e| NotifyError::InvalidApiUrl(e.to_string()))
            .context("Failed to configure notifier")?;
        self.bot = self.bot.set_api_url(url);
        Ok(self)
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, text: &str) -> Result<()> {
        let content = truncate_message(text);

        match self.bot.send_message(self.chat_id, content).await {
            Ok(sent) => {
                tracing::debug!(
                    chat_id = %self.chat_id.0,
                    message_id = ?sent.id.0,
                    "Sent notification to Telegram"
                );
                Ok(())
            }
            Err(e) => Err(NotifyError::ApiError(format!(
                "Failed to send notification to chat {}: {}",
                self.chat_id.0, e
            ))
            .into()),
        }
    }
}

/// Telegram rejects messages over 4096 characters
fn truncate_message(text: &str) -> String {
    if text.chars().count() > TELEGRAM_MAX_MESSAGE_LENGTH {
        tracing::warn!(
            original_length = text.chars().count(),
            "Notification too long, truncating to {} characters",
            TELEGRAM_MAX_MESSAGE_LENGTH
        );
        text.chars().take(TELEGRAM_MAX_MESSAGE_LENGTH).collect()
    } else {
        text.to_string()
    }
}
