use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use napomni_models::{
    chrono::TimeDelta,
    reminder::{DueAt, OwnerId, Reminder, ReminderId},
};

use crate::reminder::{
    NewReminder, ReminderChanges, ReminderStorage, StorageError, position_to_index,
};

#[derive(Default)]
struct InMemoryReminderStore {
    last_id: ReminderId,
    reminders: HashMap<ReminderId, Reminder>,
}

impl InMemoryReminderStore {
    fn in_due_order<'a>(&'a self, mut filter: impl FnMut(&Reminder) -> bool) -> Vec<&'a Reminder> {
        let mut reminders: Vec<&Reminder> =
            self.reminders.values().filter(|r| filter(*r)).collect();
        reminders.sort_by_key(|r| (r.due_at, r.id));
        reminders
    }

    fn id_at_position(&self, owner: OwnerId, position: usize) -> Result<ReminderId, StorageError> {
        let index = position_to_index(position)?;
        self.in_due_order(|r| r.owner == owner)
            .get(index)
            .map(|r| r.id)
            .ok_or(StorageError::NotFound)
    }

    fn apply(&mut self, id: ReminderId, changes: ReminderChanges) -> Result<Reminder, StorageError> {
        if changes.is_empty() {
            return Err(StorageError::EmptyUpdate);
        }

        let reminder = self.reminders.get_mut(&id).ok_or(StorageError::NotFound)?;
        if let Some(text) = changes.text {
            reminder.text = text;
        }
        if let Some(due_at) = changes.due_at {
            reminder.due_at = due_at;
            reminder.failed_deliveries = 0;
        }

        Ok(reminder.clone())
    }
}

/// Process-local storage, lost on restart.
#[derive(Default)]
pub struct InMemoryReminderStorage {
    store: RwLock<InMemoryReminderStore>,
}

impl InMemoryReminderStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReminderStorage for InMemoryReminderStorage {
    async fn add(&self, reminder: NewReminder) -> Result<Reminder, StorageError> {
        let mut store = self.store.write().await;
        store.last_id += 1;

        let created = Reminder {
            id: store.last_id,
            owner: reminder.owner,
            text: reminder.text,
            due_at: reminder.due_at,
            failed_deliveries: 0,
        };
        store.reminders.insert(created.id, created.clone());

        Ok(created)
    }

    async fn get(&self, id: ReminderId) -> Result<Option<Reminder>, StorageError> {
        let store = self.store.read().await;
        Ok(store.reminders.get(&id).cloned())
    }

    async fn list(&self, owner: OwnerId) -> Result<Vec<Reminder>, StorageError> {
        let store = self.store.read().await;
        Ok(store
            .in_due_order(|r| r.owner == owner)
            .into_iter()
            .cloned()
            .collect())
    }

    async fn get_by_position(
        &self,
        owner: OwnerId,
        position: usize,
    ) -> Result<Reminder, StorageError> {
        let store = self.store.read().await;
        let id = store.id_at_position(owner, position)?;
        store.reminders.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn update(
        &self,
        id: ReminderId,
        changes: ReminderChanges,
    ) -> Result<Reminder, StorageError> {
        self.store.write().await.apply(id, changes)
    }

    async fn delete(&self, id: ReminderId) -> Result<(), StorageError> {
        let mut store = self.store.write().await;
        store
            .reminders
            .remove(&id)
            .map(|_| ())
            .ok_or(StorageError::NotFound)
    }

    async fn clear(&self, owner: OwnerId) -> Result<u64, StorageError> {
        let mut store = self.store.write().await;
        let before = store.reminders.len();
        store.reminders.retain(|_, r| r.owner != owner);

        Ok((before - store.reminders.len()) as u64)
    }

    async fn due_before(&self, at: DueAt) -> Result<Vec<Reminder>, StorageError> {
        let store = self.store.read().await;
        Ok(store
            .in_due_order(|r| r.is_due(at))
            .into_iter()
            .cloned()
            .collect())
    }

    async fn delete_at_position(
        &self,
        owner: OwnerId,
        position: usize,
    ) -> Result<Reminder, StorageError> {
        let mut store = self.store.write().await;
        let id = store.id_at_position(owner, position)?;
        store.reminders.remove(&id).ok_or(StorageError::NotFound)
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

        let mut store = self.store.write().await;
        let id = store.id_at_position(owner, position)?;
        store.apply(id, changes)
    }

    async fn snooze_at_position(
        &self,
        owner: OwnerId,
        position: usize,
        by: TimeDelta,
    ) -> Result<Reminder, StorageError> {
        let mut store = self.store.write().await;
        let id = store.id_at_position(owner, position)?;
        let reminder = store.reminders.get_mut(&id).ok_or(StorageError::NotFound)?;
        reminder.due_at = reminder
            .due_at
            .checked_add(by)
            .ok_or(StorageError::DueAtOutOfRange)?;
        reminder.failed_deliveries = 0;

        Ok(reminder.clone())
    }

    async fn record_failed_delivery(&self, id: ReminderId) -> Result<u32, StorageError> {
        let mut store = self.store.write().await;
        let reminder = store.reminders.get_mut(&id).ok_or(StorageError::NotFound)?;
        reminder.failed_deliveries = reminder.failed_deliveries.saturating_add(1);

        Ok(reminder.failed_deliveries)
    }
}
