mod in_memory;
mod reminder;
pub mod sqlite;


pub use in_memory::InMemoryReminderStorage;
pub use reminder::{NewReminder, ReminderChanges, ReminderStorage, StorageError};
