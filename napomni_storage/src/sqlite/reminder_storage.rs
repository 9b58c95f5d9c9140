mod model;

use async_trait::async_trait;
use model::ReminderStorageModel;
use napomni_models::{
    chrono::TimeDelta,
    reminder::{DueAt, OwnerId, Reminder, ReminderId},
};

use crate::reminder::{
    NewReminder, ReminderChanges, ReminderStorage, StorageError, position_to_index,
};

// Resolves an owner's 1-based position (bound as owner, offset) to a row id.
const ID_AT_POSITION: &str =
    "SELECT id FROM reminders WHERE owner = ? ORDER BY due_at, id LIMIT 1 OFFSET ?";

pub struct SqliteReminderStorage {
    pool: sqlx::SqlitePool,
}

impl SqliteReminderStorage {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

fn position_offset(position: usize) -> Result<i64, StorageError> {
    let index = position_to_index(position)?;
    i64::try_from(index).map_err(|_| StorageError::NotFound)
}

fn into_reminders(rows: Vec<ReminderStorageModel>) -> Result<Vec<Reminder>, StorageError> {
    rows.into_iter().map(TryInto::try_into).collect()
}

#[async_trait]
impl ReminderStorage for SqliteReminderStorage {
    async fn add(&self, reminder: NewReminder) -> Result<Reminder, StorageError> {
        let NewReminder {
            owner,
            text,
            due_at,
        } = reminder;
        let due_at = due_at.to_storage_string();

        let created_reminder = sqlx::query_as::<_, ReminderStorageModel>(
            "INSERT INTO reminders (owner, text, due_at)
VALUES (?, ?, ?) RETURNING *",
        )
        .bind(owner)
        .bind(text)
        .bind(due_at)
        .fetch_one(&self.pool)
        .await?;

        created_reminder.try_into()
    }

    async fn get(&self, id: ReminderId) -> Result<Option<Reminder>, StorageError> {
        let reminder =
            sqlx::query_as::<_, ReminderStorageModel>("SELECT * FROM reminders WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        reminder.map(TryInto::try_into).transpose()
    }

    async fn list(&self, owner: OwnerId) -> Result<Vec<Reminder>, StorageError> {
        let reminders = sqlx::query_as::<_, ReminderStorageModel>(
            "SELECT * FROM reminders WHERE owner = ? ORDER BY due_at, id",
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        into_reminders(reminders)
    }

    async fn get_by_position(
        &self,
        owner: OwnerId,
        position: usize,
    ) -> Result<Reminder, StorageError> {
        let offset = position_offset(position)?;
        let reminder = sqlx::query_as::<_, ReminderStorageModel>(
            "SELECT * FROM reminders WHERE owner = ? ORDER BY due_at, id LIMIT 1 OFFSET ?",
        )
        .bind(owner)
        .bind(offset)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StorageError::NotFound)?;

        reminder.try_into()
    }

    async fn update(
        &self,
        id: ReminderId,
        changes: ReminderChanges,
    ) -> Result<Reminder, StorageError> {
        if changes.is_empty() {
            return Err(StorageError::EmptyUpdate);
        }
        let ReminderChanges { text, due_at } = changes;
        let due_at = due_at.map(|due_at| due_at.to_storage_string());

        let updated_reminder = sqlx::query_as::<_, ReminderStorageModel>(
            "
UPDATE reminders
SET text = COALESCE(?, text),
    due_at = COALESCE(?, due_at),
    failed_deliveries = CASE WHEN ? IS NULL THEN failed_deliveries ELSE 0 END
WHERE id = ?
RETURNING *
",
        )
        .bind(text)
        .bind(due_at.clone())
        .bind(due_at)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StorageError::NotFound)?;

        updated_reminder.try_into()
    }

    async fn delete(&self, id: ReminderId) -> Result<(), StorageError> {
        let result = sqlx::query("DELETE FROM reminders WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }

        Ok(())
    }

    async fn clear(&self, owner: OwnerId) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM reminders WHERE owner = ?")
            .bind(owner)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn due_before(&self, at: DueAt) -> Result<Vec<Reminder>, StorageError> {
        let reminders = sqlx::query_as::<_, ReminderStorageModel>(
            "SELECT * FROM reminders WHERE due_at <= ? ORDER BY due_at, id",
        )
        .bind(at.to_storage_string())
        .fetch_all(&self.pool)
        .await?;

        // Unreadable rows must not hold back everybody else's reminders.
        let due = reminders
            .into_iter()
            .filter_map(|row| match Reminder::try_from(row) {
                Ok(reminder) => Some(reminder),
                Err(err) => {
                    log::error!("Skipping unreadable reminder: {err}");
                    None
                }
            })
            .collect();

        Ok(due)
    }

    async fn delete_at_position(
        &self,
        owner: OwnerId,
        position: usize,
    ) -> Result<Reminder, StorageError> {
        let offset = position_offset(position)?;
        let deleted_reminder = sqlx::query_as::<_, ReminderStorageModel>(&format!(
            "DELETE FROM reminders WHERE id = ({ID_AT_POSITION}) RETURNING *"
        ))
        .bind(owner)
        .bind(offset)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StorageError::NotFound)?;

        deleted_reminder.try_into()
    }

    async fn update_at_position(
        &self,
        owner: OwnerId,
        position: usize,
        changes: ReminderChanges,
    ) -> Result<Reminder, StorageError> {
        if changes.is_empty() {
            return Err(StorageError::EmptyUpdate);
        }
        let offset = position_offset(position)?;
        let ReminderChanges { text, due_at } = changes;
        let due_at = due_at.map(|due_at| due_at.to_storage_string());

        let updated_reminder = sqlx::query_as::<_, ReminderStorageModel>(&format!(
            "
UPDATE reminders
SET text = COALESCE(?, text),
    due_at = COALESCE(?, due_at),
    failed_deliveries = CASE WHEN ? IS NULL THEN failed_deliveries ELSE 0 END
WHERE id = ({ID_AT_POSITION})
RETURNING *
"
        ))
        .bind(text)
        .bind(due_at.clone())
        .bind(due_at)
        .bind(owner)
        .bind(offset)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StorageError::NotFound)?;

        updated_reminder.try_into()
    }

    async fn snooze_at_position(
        &self,
        owner: OwnerId,
        position: usize,
        by: TimeDelta,
    ) -> Result<Reminder, StorageError> {
        let offset = position_offset(position)?;
        // Dropping the transaction on an early return rolls it back.
        let mut tx = self.pool.begin().await?;

        let current: Reminder = sqlx::query_as::<_, ReminderStorageModel>(&format!(
            "SELECT * FROM reminders WHERE id = ({ID_AT_POSITION})"
        ))
        .bind(owner)
        .bind(offset)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StorageError::NotFound)?
        .try_into()?;

        let due_at = current
            .due_at
            .checked_add(by)
            .ok_or(StorageError::DueAtOutOfRange)?;

        let snoozed_reminder = sqlx::query_as::<_, ReminderStorageModel>(
            "UPDATE reminders SET due_at = ?, failed_deliveries = 0 WHERE id = ? RETURNING *",
        )
        .bind(due_at.to_storage_string())
        .bind(current.id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        snoozed_reminder.try_into()
    }

    async fn record_failed_delivery(&self, id: ReminderId) -> Result<u32, StorageError> {
        let failed_deliveries = sqlx::query_scalar::<_, i64>(
            "UPDATE reminders
SET failed_deliveries = failed_deliveries + 1
WHERE id = ?
RETURNING failed_deliveries",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StorageError::NotFound)?;

        Ok(u32::try_from(failed_deliveries).unwrap_or(u32::MAX))
    }
}
