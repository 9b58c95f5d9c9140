use napomni_models::reminder::{DueAt, Reminder};

use crate::StorageError;

#[derive(sqlx::FromRow)]
pub struct ReminderStorageModel {
    pub id: i64,
    pub owner: i64,
    pub text: String,
    pub due_at: String,
    pub failed_deliveries: i64,
}

impl From<Reminder> for ReminderStorageModel {
    fn from(value: Reminder) -> Self {
        Self {
            id: value.id,
            owner: value.owner,
            text: value.text,
            due_at: value.due_at.to_storage_string(),
            failed_deliveries: value.failed_deliveries.into(),
        }
    }
}

impl TryFrom<ReminderStorageModel> for Reminder {
    type Error = StorageError;

    fn try_from(value: ReminderStorageModel) -> Result<Self, Self::Error> {
        let due_at =
            DueAt::parse_storage(&value.due_at).map_err(|err| StorageError::Corrupted {
                id: value.id,
                reason: format!("due_at `{}`: {err}", value.due_at),
            })?;

        Ok(Self {
            id: value.id,
            owner: value.owner,
            text: value.text,
            due_at,
            failed_deliveries: u32::try_from(value.failed_deliveries.max(0)).unwrap_or(u32::MAX),
        })
    }
}
