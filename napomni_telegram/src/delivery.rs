use async_trait::async_trait;
use napomni_models::reminder::OwnerId;
use napomni_scheduler::{DeliveryError, ReminderDeliveryChannel};
use teloxide::prelude::*;

pub struct TelegramDeliveryChannel {
    bot: Bot,
}

impl TelegramDeliveryChannel {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl ReminderDeliveryChannel for TelegramDeliveryChannel {
    async fn send(&self, recipient: OwnerId, text: &str) -> Result<(), DeliveryError> {
        self.bot
            .send_message(ChatId(recipient), text)
            .await
            .map_err(anyhow::Error::from)?;

        Ok(())
    }
}
