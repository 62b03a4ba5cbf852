//! Notifier that writes to the log

use async_trait::async_trait;
use tracing::info;

use super::Notifier;
use crate::error::Result;
use crate::wallet::OwnerId;

/// Used when no messaging channel is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, owner_id: OwnerId, message: &str) -> Result<()> {
        info!(owner_id, "Notification: {}", message.replace('\n', " | "));
        Ok(())
    }
}
