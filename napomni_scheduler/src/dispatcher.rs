use std::{sync::Arc, time::Duration};

use napomni_models::{
    chrono::{DateTime, Utc},
    reminder::{DueAt, Reminder},
    settings,
};
use napomni_storage::{ReminderStorage, StorageError};
use tokio::{
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::delivery::{DeliveryError, ReminderDeliveryChannel, delivery_text};

const MIN_INTERVAL: Duration = Duration::from_secs(1);
const MIN_DELIVERY_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy)]
pub struct DispatchSettings {
    /// Time between two dispatch cycles, also the longest a single cycle may run.
    pub interval: Duration,
    pub delivery_timeout: Duration,
    /// Failed deliveries after which a reminder is dropped.
    pub max_delivery_attempts: u32,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            delivery_timeout: Duration::from_secs(10),
            max_delivery_attempts: 5,
        }
    }
}

impl From<&settings::DispatchSettings> for DispatchSettings {
    fn from(value: &settings::DispatchSettings) -> Self {
        Self {
            interval: Duration::from_secs(value.interval_secs).max(MIN_INTERVAL),
            delivery_timeout: Duration::from_secs(value.delivery_timeout_secs)
                .max(MIN_DELIVERY_TIMEOUT),
            max_delivery_attempts: value.max_delivery_attempts.max(1),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub delivered: usize,
    pub failed: usize,
    pub abandoned: usize,
    /// Due reminders left for the next cycle because of shutdown or the cycle deadline.
    pub deferred: usize,
}

impl CycleReport {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

enum DeliveryOutcome {
    Delivered,
    Failed,
    Abandoned,
}

/// Periodically delivers due reminders and removes them from storage.
pub struct ReminderDispatcher {
    storage: Arc<dyn ReminderStorage>,
    channel: Arc<dyn ReminderDeliveryChannel>,
    settings: DispatchSettings,
    shutdown: CancellationToken,
}

impl ReminderDispatcher {
    pub fn new(
        storage: Arc<dyn ReminderStorage>,
        channel: Arc<dyn ReminderDeliveryChannel>,
        settings: DispatchSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            storage,
            channel,
            settings,
            shutdown,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Runs a cycle right away and then every `interval` until shutdown.
    pub async fn run(self) {
        log::info!(
            "Starting reminder dispatcher. [interval = {:?}, delivery_timeout = {:?}]",
            self.settings.interval,
            self.settings.delivery_timeout
        );

        let mut interval = time::interval(self.settings.interval.max(MIN_INTERVAL));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                _ = interval.tick() => {
                    let report = self.run_cycle(Utc::now()).await;
                    if !report.is_empty() {
                        log::info!("Dispatch cycle finished {report:?}");
                    }
                }
            }
        }

        log::info!("Reminder dispatcher stopped");
    }

    /// Delivers everything due at `now`. Never fails: problems with single
    /// reminders are logged and left for later cycles.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> CycleReport {
        let mut report = CycleReport::default();
        let due = match self.storage.due_before(DueAt::from_utc(now)).await {
            Ok(due) => due,
            Err(err) => {
                log::error!("Could not load due reminders: {err}");
                return report;
            }
        };

        let deadline = Instant::now() + self.settings.interval;
        for (handled, reminder) in due.iter().enumerate() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if self.shutdown.is_cancelled() || remaining.is_zero() {
                report.deferred = due.len() - handled;
                log::info!(
                    "Leaving {} due reminders for the next cycle",
                    report.deferred
                );
                break;
            }

            let timeout = self.settings.delivery_timeout.min(remaining);
            match self.dispatch(reminder, timeout).await {
                DeliveryOutcome::Delivered => report.delivered += 1,
                DeliveryOutcome::Failed => report.failed += 1,
                DeliveryOutcome::Abandoned => report.abandoned += 1,
            }
        }

        report
    }

    async fn dispatch(&self, reminder: &Reminder, timeout: Duration) -> DeliveryOutcome {
        if let Err(err) = self.deliver(reminder, timeout).await {
            log::warn!(
                "Could not deliver reminder. [reminder_id = {}, owner = {}, error = {}]",
                reminder.id,
                reminder.owner,
                err
            );
            return self.record_failure(reminder).await;
        }

        match self.storage.delete(reminder.id).await {
            Ok(()) => log::info!("Delivered reminder {}", reminder.id),
            Err(StorageError::NotFound) => {
                log::debug!("Reminder {} was removed during delivery", reminder.id)
            }
            // It stays due and will be sent again next cycle.
            Err(err) => log::error!(
                "Delivered reminder {} could not be removed: {err}",
                reminder.id
            ),
        }

        DeliveryOutcome::Delivered
    }

    async fn deliver(&self, reminder: &Reminder, timeout: Duration) -> Result<(), DeliveryError> {
        let text = delivery_text(reminder);
        time::timeout(timeout, self.channel.send(reminder.owner, &text))
            .await
            .map_err(|_| DeliveryError::Timeout(timeout))?
    }

    async fn record_failure(&self, reminder: &Reminder) -> DeliveryOutcome {
        let attempts = match self.storage.record_failed_delivery(reminder.id).await {
            Ok(attempts) => attempts,
            Err(StorageError::NotFound) => return DeliveryOutcome::Failed,
            Err(err) => {
                log::error!(
                    "Could not record failed delivery of reminder {}: {err}",
                    reminder.id
                );
                return DeliveryOutcome::Failed;
            }
        };

        if attempts < self.settings.max_delivery_attempts {
            return DeliveryOutcome::Failed;
        }

        log::error!(
            "Giving up on reminder. [reminder_id = {}, owner = {}, attempts = {}]",
            reminder.id,
            reminder.owner,
            attempts
        );
        match self.storage.delete(reminder.id).await {
            Ok(()) | Err(StorageError::NotFound) => {}
            Err(err) => log::error!("Could not remove reminder {}: {err}", reminder.id),
        }

        DeliveryOutcome::Abandoned
    }
}

#[cfg(test)]
mod tests;
