mod appsettings;

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use napomni_models::time::TimeNormalizer;
use napomni_scheduler::ReminderDispatcher;
use napomni_storage::{
    ReminderStorage,
    sqlite::{self, SqliteReminderStorage},
};
use napomni_telegram::{
    ReminderCommands, TelegramDeliveryChannel, TelegramInteractionInterface, teloxide::Bot,
};
use tokio_util::sync::CancellationToken;

const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    pretty_env_logger::init();

    let settings = appsettings::load().context("Could not load appsettings")?;
    anyhow::ensure!(
        !settings.telegram.token.is_empty(),
        "telegram.token is not configured"
    );
    let normalizer = TimeNormalizer::from_offset_minutes(settings.time.utc_offset_minutes)?;

    let pool = sqlite::connect(&settings.storage.database_url)
        .await
        .context("Could not open the reminder database")?;
    let storage: Arc<dyn ReminderStorage> = Arc::new(SqliteReminderStorage::new(pool));

    let bot = Bot::new(settings.telegram.token);
    let shutdown = CancellationToken::new();
    let dispatcher = ReminderDispatcher::new(
        storage.clone(),
        Arc::new(TelegramDeliveryChannel::new(bot.clone())),
        (&settings.dispatch).into(),
        shutdown.clone(),
    )
    .spawn();

    let commands = Arc::new(ReminderCommands::new(storage, normalizer));
    TelegramInteractionInterface::start(bot, commands).await;

    log::info!("Shutting down.");
    shutdown.cancel();
    match tokio::time::timeout(SHUTDOWN_GRACE_PERIOD, dispatcher).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => log::error!("Dispatcher task failed: {err}"),
        Err(_) => log::warn!("Dispatcher did not stop within {SHUTDOWN_GRACE_PERIOD:?}"),
    }

    Ok(())
}
