use async_trait::async_trait;
use thiserror::Error;

use napomni_models::{
    chrono::TimeDelta,
    reminder::{DueAt, OwnerId, Reminder, ReminderId},
};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Reminder does not exist")]
    NotFound,

    #[error("Update does not change anything")]
    EmptyUpdate,

    #[error("Resulting due time is out of range")]
    DueAtOutOfRange,

    #[error("Reminder {id} is corrupted: {reason}")]
    Corrupted { id: ReminderId, reason: String },

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

pub struct NewReminder {
    pub owner: OwnerId,
    pub text: String,
    pub due_at: DueAt,
}

/// Partial update of a reminder. Fields left as `None` keep their value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReminderChanges {
    pub text: Option<String>,
    pub due_at: Option<DueAt>,
}

impl ReminderChanges {
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.due_at.is_none()
    }
}

/// Persistent set of pending reminders.
///
/// Every call is atomic on its own. Positions are 1-based indexes into the
/// owner's reminders ordered by `due_at`, then `id`; the `*_at_position`
/// operations resolve the position and change the record in one step, so
/// they never act on an ordering computed by an earlier call.
#[async_trait]
pub trait ReminderStorage: Send + Sync {
    async fn add(&self, reminder: NewReminder) -> Result<Reminder, StorageError>;
    async fn get(&self, id: ReminderId) -> Result<Option<Reminder>, StorageError>;
    async fn list(&self, owner: OwnerId) -> Result<Vec<Reminder>, StorageError>;
    async fn get_by_position(
        &self,
        owner: OwnerId,
        position: usize,
    ) -> Result<Reminder, StorageError>;
    async fn update(
        &self,
        id: ReminderId,
        changes: ReminderChanges,
    ) -> Result<Reminder, StorageError>;
    async fn delete(&self, id: ReminderId) -> Result<(), StorageError>;
    async fn clear(&self, owner: OwnerId) -> Result<u64, StorageError>;

    /// All reminders with `due_at <= at`, across owners.
    async fn due_before(&self, at: DueAt) -> Result<Vec<Reminder>, StorageError>;

    async fn delete_at_position(
        &self,
        owner: OwnerId,
        position: usize,
    ) -> Result<Reminder, StorageError>;
    async fn update_at_position(
        &self,
        owner: OwnerId,
        position: usize,
        changes: ReminderChanges,
    ) -> Result<Reminder, StorageError>;
    async fn snooze_at_position(
        &self,
        owner: OwnerId,
        position: usize,
        by: TimeDelta,
    ) -> Result<Reminder, StorageError>;

    /// Bumps the failed delivery counter and returns its new value.
    async fn record_failed_delivery(&self, id: ReminderId) -> Result<u32, StorageError>;
}

pub(crate) fn position_to_index(position: usize) -> Result<usize, StorageError> {
    position.checked_sub(1).ok_or(StorageError::NotFound)
}
