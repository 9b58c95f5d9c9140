use std::time::Duration;

use async_trait::async_trait;
use napomni_models::reminder::{OwnerId, Reminder};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Delivery timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

/// Outbound side of the chat transport.
#[async_trait]
pub trait ReminderDeliveryChannel: Send + Sync + 'static {
    async fn send(&self, recipient: OwnerId, text: &str) -> Result<(), DeliveryError>;
}

pub fn delivery_text(reminder: &Reminder) -> String {
    format!("⏰ Reminder: {}", reminder.text)
}
