//! Owner notifications
//!
//! Delivery is best effort: the sweep engine logs a failed notification and
//! carries on.

pub mod log;
pub mod messages;
pub mod telegram;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::NotifierConfig;
use crate::error::Result;
use crate::wallet::OwnerId;

pub use self::log::LogNotifier;
pub use telegram::TelegramNotifier;

/// Delivers a human-readable message to a wallet owner
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, owner_id: OwnerId, message: &str) -> Result<()>;
}

/// Telegram when a bot token is configured, the log otherwise
pub fn from_config(config: &NotifierConfig) -> Result<Arc<dyn Notifier>> {
    if config.telegram_bot_token.is_empty() {
        tracing::warn!("No Telegram bot token configured, notifications go to the log");
        Ok(Arc::new(LogNotifier::new()))
    } else {
        Ok(Arc::new(TelegramNotifier::new(config)?))
    }
}
