pub mod delivery;
mod dispatcher;

pub use delivery::{DeliveryError, ReminderDeliveryChannel, delivery_text};
pub use dispatcher::{CycleReport, DispatchSettings, ReminderDispatcher};
