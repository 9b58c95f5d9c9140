mod commands;
mod delivery;

pub use commands::{
    CommandError, DELETE_USAGE, EDIT_USAGE, MAX_MESSAGE_LEN, ReminderCommands, SNOOZE_USAGE,
    split_message,
};
pub use delivery::TelegramDeliveryChannel;
pub use teloxide;

use std::sync::Arc;

use dptree::case;
use napomni_models::time::INPUT_EXAMPLE;
use teloxide::{prelude::*, utils::command::BotCommands};

type HandlerResult = anyhow::Result<()>;
type HandlerCommandsType = Arc<ReminderCommands>;

pub struct TelegramInteractionInterface;

impl TelegramInteractionInterface {
    /// Polls Telegram until ctrl-c.
    pub async fn start(bot: Bot, commands: HandlerCommandsType) {
        log::info!("Starting Telegram UI.");

        if let Err(err) = bot.set_my_commands(Command::bot_commands()).await {
            log::warn!("Could not register bot commands: {err}");
        }

        let command_handler = teloxide::filter_command::<Command, _>()
            .branch(case![Command::Start].endpoint(start))
            .branch(case![Command::Help].endpoint(help))
            .branch(case![Command::List].endpoint(list))
            .branch(case![Command::Delete(args)].endpoint(delete))
            .branch(case![Command::Edit(args)].endpoint(edit))
            .branch(case![Command::Snooze(args)].endpoint(snooze))
            .branch(case![Command::Clear].endpoint(clear));

        let schema = Update::filter_message()
            .branch(command_handler)
            .branch(Message::filter_text().endpoint(create))
            .branch(dptree::endpoint(invalid_message));

        Dispatcher::builder(bot, schema)
            .dependencies(dptree::deps![commands])
            .enable_ctrlc_handler()
            .build()
            .dispatch()
            .await
    }
}

#[derive(BotCommands, Clone)]
#[command(
    rename_rule = "lowercase",
    description = "These commands are supported:"
)]
enum Command {
    #[command(description = "show the welcome message.")]
    Start,
    #[command(description = "show this text.")]
    Help,
    #[command(description = "list your reminders.")]
    List,
    #[command(description = "delete a reminder, e.g. /delete 2")]
    Delete(String),
    #[command(description = "change text or time, e.g. /edit 2 16.08.2025 09:30 Call Alice")]
    Edit(String),
    #[command(description = "postpone a reminder, e.g. /snooze 2 1h (10m, 1h, 1d)")]
    Snooze(String),
    #[command(description = "delete all your reminders.")]
    Clear,
}

fn help_text() -> String {
    format!(
        "Send a message like\n{INPUT_EXAMPLE}\nto create a reminder.\n\n{}",
        Command::descriptions()
    )
}

async fn send_outcome<T>(
    bot: &Bot,
    msg: &Message,
    outcome: Result<T, CommandError>,
    reply: impl FnOnce(T) -> String,
) -> HandlerResult {
    let text = match outcome {
        Ok(value) => reply(value),
        Err(err) => {
            if let CommandError::Storage(source) = &err {
                log::error!(
                    "Command failed. [chat_id = {}, error = {}]",
                    msg.chat.id,
                    source
                );
            }
            err.reply_text()
        }
    };

    for message in split_message(&text, MAX_MESSAGE_LEN) {
        bot.send_message(msg.chat.id, message).await?;
    }
    Ok(())
}

async fn start(bot: Bot, msg: Message) -> HandlerResult {
    bot.send_message(
        msg.chat.id,
        format!("Hi! I am a reminder bot.\n\n{}", help_text()),
    )
    .await?;
    Ok(())
}

async fn help(bot: Bot, msg: Message) -> HandlerResult {
    bot.send_message(msg.chat.id, help_text()).await?;
    Ok(())
}

async fn create(
    bot: Bot,
    msg: Message,
    text: String,
    commands: HandlerCommandsType,
) -> HandlerResult {
    if text.starts_with('/') {
        bot.send_message(msg.chat.id, "Unknown command. Use /help to see what I can do.")
            .await?;
        return Ok(());
    }

    let outcome = commands.create(msg.chat.id.0, &text).await;
    send_outcome(&bot, &msg, outcome, |reminder| {
        commands.created_reply(&reminder)
    })
    .await
}

async fn list(bot: Bot, msg: Message, commands: HandlerCommandsType) -> HandlerResult {
    let outcome = commands.list(msg.chat.id.0).await;
    send_outcome(&bot, &msg, outcome, |reminders| {
        commands.list_reply(&reminders)
    })
    .await
}

async fn delete(
    bot: Bot,
    msg: Message,
    args: String,
    commands: HandlerCommandsType,
) -> HandlerResult {
    let outcome = commands.delete(msg.chat.id.0, &args).await;
    send_outcome(&bot, &msg, outcome, |reminder| {
        commands.deleted_reply(&reminder)
    })
    .await
}

async fn edit(
    bot: Bot,
    msg: Message,
    args: String,
    commands: HandlerCommandsType,
) -> HandlerResult {
    let outcome = commands.edit(msg.chat.id.0, &args).await;
    send_outcome(&bot, &msg, outcome, |reminder| {
        commands.edited_reply(&reminder)
    })
    .await
}

async fn snooze(
    bot: Bot,
    msg: Message,
    args: String,
    commands: HandlerCommandsType,
) -> HandlerResult {
    let outcome = commands.snooze(msg.chat.id.0, &args).await;
    send_outcome(&bot, &msg, outcome, |reminder| {
        commands.snoozed_reply(&reminder)
    })
    .await
}

async fn clear(bot: Bot, msg: Message, commands: HandlerCommandsType) -> HandlerResult {
    let outcome = commands.clear(msg.chat.id.0).await;
    send_outcome(&bot, &msg, outcome, |removed| commands.cleared_reply(removed)).await
}

async fn invalid_message(bot: Bot, msg: Message) -> HandlerResult {
    bot.send_message(
        msg.chat.id,
        format!("Only text messages are supported. Example: {INPUT_EXAMPLE}"),
    )
    .await?;
    Ok(())
}
