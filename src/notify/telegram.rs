//! Telegram Bot API notifier

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use super::Notifier;
use crate::chain::rpc::http_client;
use crate::config::NotifierConfig;
use crate::error::{Error, Result};
use crate::wallet::OwnerId;

/// Sends notifications through `sendMessage`; the owner id is the chat id
pub struct TelegramNotifier {
    api_url: String,
    bot_token: String,
    client: reqwest::Client,
}

impl TelegramNotifier {
    pub fn new(config: &NotifierConfig) -> Result<Self> {
        if config.telegram_bot_token.is_empty() {
            return Err(Error::Config("Telegram bot token is empty".into()));
        }

        Ok(Self {
            api_url: config.telegram_api_url.trim_end_matches('/').to_string(),
            bot_token: config.telegram_bot_token.clone(),
            client: http_client(config.timeout_ms)?,
        })
    }

    fn send_message_url(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_url, self.bot_token)
    }
}

impl std::fmt::Debug for TelegramNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramNotifier")
            .field("api_url", &self.api_url)
            .field("bot_token", &"***")
            .finish()
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, owner_id: OwnerId, message: &str) -> Result<()> {
        let response = self
            .client
            .post(self.send_message_url())
            .json(&json!({
                "chat_id": owner_id,
                "text": message,
                "parse_mode": "Markdown",
                "disable_web_page_preview": true,
            }))
            .send()
            .await
            .map_err(|e| Error::Notification(format!("Telegram request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Notification(format!(
                "Telegram returned {}: {}",
                status, body
            )));
        }

        debug!(owner_id, "Telegram notification delivered");
        Ok(())
    }
}
