use std::sync::Arc;

use napomni_models::{
    reminder::{OwnerId, Reminder},
    time::{self, FormatError, TimeNormalizer},
};
use napomni_storage::{NewReminder, ReminderChanges, ReminderStorage, StorageError};
use thiserror::Error;

pub const DELETE_USAGE: &str = "/delete <position>";
pub const EDIT_USAGE: &str = "/edit <position> <text> or /edit <position> DD.MM.YYYY HH:MM [text]";
pub const SNOOZE_USAGE: &str = "/snooze <position> <10m|1h|1d>";

/// Telegram's limit on message length, in UTF-16 code units.
pub const MAX_MESSAGE_LEN: usize = 4096;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("No reminder at that position")]
    NotFound,

    #[error(transparent)]
    Storage(StorageError),
}

impl From<StorageError> for CommandError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::NotFound => Self::NotFound,
            other => Self::Storage(other),
        }
    }
}

impl CommandError {
    /// Message shown to the user in place of the command result.
    pub fn reply_text(&self) -> String {
        match self {
            Self::Format(err) => format!("❌ {err}"),
            Self::Usage(usage) => format!("❌ Usage: {usage}"),
            Self::NotFound => {
                "❌ There is no reminder at that position. Use /list to see your reminders."
                    .to_string()
            }
            Self::Storage(StorageError::DueAtOutOfRange) => {
                "❌ The reminder cannot be moved that far.".to_string()
            }
            Self::Storage(_) => "🚨 Something went wrong. Please try again later.".to_string(),
        }
    }
}

/// Reminder operations available to a chat, independent of the transport.
pub struct ReminderCommands {
    storage: Arc<dyn ReminderStorage>,
    normalizer: TimeNormalizer,
}

impl ReminderCommands {
    pub fn new(storage: Arc<dyn ReminderStorage>, normalizer: TimeNormalizer) -> Self {
        Self {
            storage,
            normalizer,
        }
    }

    pub async fn create(&self, owner: OwnerId, input: &str) -> Result<Reminder, CommandError> {
        let (local, text) = time::parse(input)?;
        let reminder = self
            .storage
            .add(NewReminder {
                owner,
                text: text.to_string(),
                due_at: self.normalizer.to_canonical(local)?,
            })
            .await?;

        log::info!(
            "Created reminder. [reminder_id = {}, owner = {}, due_at = {}]",
            reminder.id,
            owner,
            reminder.due_at
        );
        Ok(reminder)
    }

    pub async fn list(&self, owner: OwnerId) -> Result<Vec<Reminder>, CommandError> {
        Ok(self.storage.list(owner).await?)
    }

    pub async fn delete(&self, owner: OwnerId, args: &str) -> Result<Reminder, CommandError> {
        let (position, rest) = parse_position(args, DELETE_USAGE)?;
        if !rest.is_empty() {
            return Err(CommandError::Usage(DELETE_USAGE));
        }

        let reminder = self.storage.delete_at_position(owner, position).await?;
        log::info!("Deleted reminder {} of {owner}", reminder.id);
        Ok(reminder)
    }

    /// Accepts `<position> <text>` or `<position> DD.MM.YYYY HH:MM [text]`.
    /// Only the supplied fields change.
    pub async fn edit(&self, owner: OwnerId, args: &str) -> Result<Reminder, CommandError> {
        let (position, rest) = parse_position(args, EDIT_USAGE)?;
        if rest.is_empty() {
            return Err(CommandError::Usage(EDIT_USAGE));
        }

        let changes = match time::split_datetime(rest) {
            Ok((local, text)) => ReminderChanges {
                text: (!text.is_empty()).then(|| text.to_string()),
                due_at: Some(self.normalizer.to_canonical(local)?),
            },
            Err(FormatError::Pattern) => ReminderChanges {
                text: Some(rest.to_string()),
                due_at: None,
            },
            Err(err) => return Err(err.into()),
        };

        let reminder = self
            .storage
            .update_at_position(owner, position, changes)
            .await?;
        log::info!("Edited reminder {} of {owner}", reminder.id);
        Ok(reminder)
    }

    pub async fn snooze(&self, owner: OwnerId, args: &str) -> Result<Reminder, CommandError> {
        let (position, token) = parse_position(args, SNOOZE_USAGE)?;
        if token.is_empty() {
            return Err(CommandError::Usage(SNOOZE_USAGE));
        }
        let delay = time::parse_snooze(token)?;

        let reminder = self
            .storage
            .snooze_at_position(owner, position, delay)
            .await?;
        log::info!(
            "Snoozed reminder {} of {owner} until {}",
            reminder.id,
            reminder.due_at
        );
        Ok(reminder)
    }

    pub async fn clear(&self, owner: OwnerId) -> Result<u64, CommandError> {
        let removed = self.storage.clear(owner).await?;
        log::info!("Cleared {removed} reminders of {owner}");
        Ok(removed)
    }

    pub fn created_reply(&self, reminder: &Reminder) -> String {
        format!(
            "✅ Reminder set for {}: {}",
            self.normalizer.to_display(reminder.due_at),
            reminder.text
        )
    }

    pub fn list_reply(&self, reminders: &[Reminder]) -> String {
        if reminders.is_empty() {
            return "You have no reminders.".to_string();
        }

        reminders
            .iter()
            .enumerate()
            .map(|(i, reminder)| {
                format!(
                    "{}. {} {}",
                    i + 1,
                    self.normalizer.to_display(reminder.due_at),
                    reminder.text
                )
            })
            .collect::<Vec<String>>()
            .join("\n")
    }

    pub fn deleted_reply(&self, reminder: &Reminder) -> String {
        format!("🗑 Deleted: {}", reminder.text)
    }

    pub fn edited_reply(&self, reminder: &Reminder) -> String {
        format!(
            "✏️ Updated: {} {}",
            self.normalizer.to_display(reminder.due_at),
            reminder.text
        )
    }

    pub fn snoozed_reply(&self, reminder: &Reminder) -> String {
        format!(
            "💤 Snoozed until {}: {}",
            self.normalizer.to_display(reminder.due_at),
            reminder.text
        )
    }

    pub fn cleared_reply(&self, removed: u64) -> String {
        match removed {
            0 => "You have no reminders.".to_string(),
            removed => format!("🧹 Removed {removed} reminders."),
        }
    }
}

/// Splits `text` into messages of at most `limit` UTF-16 code units, breaking
/// between lines where possible.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let mut messages = Vec::new();
    let mut current = String::new();

    for line in text.split('\n') {
        for piece in wrap_line(line, limit) {
            if !current.is_empty() && utf16_len(&current) + 1 + utf16_len(&piece) > limit {
                messages.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(&piece);
        }
    }

    if !current.is_empty() || messages.is_empty() {
        messages.push(current);
    }
    messages
}

fn wrap_line(line: &str, limit: usize) -> Vec<String> {
    if utf16_len(line) <= limit {
        return vec![line.to_string()];
    }

    let mut pieces = Vec::new();
    let mut piece = String::new();
    let mut piece_len = 0;
    for c in line.chars() {
        if piece_len + c.len_utf16() > limit {
            pieces.push(std::mem::take(&mut piece));
            piece_len = 0;
        }
        piece.push(c);
        piece_len += c.len_utf16();
    }
    pieces.push(piece);
    pieces
}

fn utf16_len(text: &str) -> usize {
    text.encode_utf16().count()
}

/// Splits the leading 1-based position from the rest of the arguments.
fn parse_position<'a>(
    args: &'a str,
    usage: &'static str,
) -> Result<(usize, &'a str), CommandError> {
    let args = args.trim();
    let (position, rest) = args
        .split_once(char::is_whitespace)
        .unwrap_or((args, ""));
    let position = position
        .parse::<usize>()
        .map_err(|_| CommandError::Usage(usage))?;

    Ok((position, rest.trim()))
}
