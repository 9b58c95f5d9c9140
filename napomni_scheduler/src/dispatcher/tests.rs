use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use napomni_models::{
    chrono::{DateTime, NaiveDateTime, TimeDelta, Utc},
    reminder::{DueAt, OwnerId},
};
use napomni_storage::{InMemoryReminderStorage, NewReminder, ReminderStorage};
use proptest::prelude::*;
use test_strategy::proptest;
use tokio_util::sync::CancellationToken;

use super::*;

type SentMessages = Arc<Mutex<Vec<(OwnerId, String)>>>;

#[derive(Clone, Default)]
struct TestDeliveryChannel {
    sent: SentMessages,
    failing: Arc<Mutex<HashSet<OwnerId>>>,
    hanging: Arc<Mutex<HashSet<OwnerId>>>,
}

impl TestDeliveryChannel {
    fn fail_for(&self, owner: OwnerId) {
        self.failing.lock().unwrap().insert(owner);
    }

    fn recover(&self, owner: OwnerId) {
        self.failing.lock().unwrap().remove(&owner);
    }

    fn hang_for(&self, owner: OwnerId) {
        self.hanging.lock().unwrap().insert(owner);
    }

    fn sent(&self) -> Vec<(OwnerId, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReminderDeliveryChannel for TestDeliveryChannel {
    async fn send(&self, recipient: OwnerId, text: &str) -> Result<(), DeliveryError> {
        let hangs = self.hanging.lock().unwrap().contains(&recipient);
        if hangs {
            std::future::pending::<()>().await;
        }

        let fails = self.failing.lock().unwrap().contains(&recipient);
        if fails {
            return Err(anyhow::anyhow!("chat {recipient} is unreachable").into());
        }

        self.sent.lock().unwrap().push((recipient, text.to_string()));
        Ok(())
    }
}

struct TestContext {
    storage: Arc<InMemoryReminderStorage>,
    channel: TestDeliveryChannel,
    shutdown: CancellationToken,
    dispatcher: ReminderDispatcher,
}

impl TestContext {
    fn new() -> Self {
        Self::with_settings(DispatchSettings {
            interval: Duration::from_secs(60),
            delivery_timeout: Duration::from_secs(10),
            max_delivery_attempts: 3,
        })
    }

    fn with_settings(settings: DispatchSettings) -> Self {
        let storage = Arc::new(InMemoryReminderStorage::new());
        let channel = TestDeliveryChannel::default();
        let shutdown = CancellationToken::new();
        let dispatcher = ReminderDispatcher::new(
            storage.clone(),
            Arc::new(channel.clone()),
            settings,
            shutdown.clone(),
        );

        Self {
            storage,
            channel,
            shutdown,
            dispatcher,
        }
    }

    async fn add(&self, owner: OwnerId, text: &str, due_at: &str) -> Reminder {
        self.storage
            .add(NewReminder {
                owner,
                text: text.to_string(),
                due_at: DueAt::parse_storage(due_at).unwrap(),
            })
            .await
            .unwrap()
    }
}

fn utc(value: &str) -> DateTime<Utc> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M")
        .unwrap()
        .and_utc()
}

#[test]
fn zero_settings_are_raised_to_minimums() {
    let settings = DispatchSettings::from(&settings::DispatchSettings {
        interval_secs: 0,
        delivery_timeout_secs: 0,
        max_delivery_attempts: 0,
    });

    assert_eq!(settings.interval, Duration::from_secs(1));
    assert_eq!(settings.delivery_timeout, Duration::from_secs(1));
    assert_eq!(settings.max_delivery_attempts, 1);
}

#[test]
fn configured_settings_are_kept() {
    let settings = DispatchSettings::from(&settings::DispatchSettings {
        interval_secs: 30,
        delivery_timeout_secs: 5,
        max_delivery_attempts: 7,
    });

    assert_eq!(settings.interval, Duration::from_secs(30));
    assert_eq!(settings.delivery_timeout, Duration::from_secs(5));
    assert_eq!(settings.max_delivery_attempts, 7);
}

#[tokio::test]
async fn due_reminder_is_sent_and_removed() {
    let ctx = TestContext::new();
    ctx.add(1, "Call Bob", "2025-08-15 11:00").await;

    let report = ctx.dispatcher.run_cycle(utc("2025-08-15 11:00")).await;

    assert_eq!(report.delivered, 1);
    assert_eq!(ctx.channel.sent(), [(1, "⏰ Reminder: Call Bob".to_string())]);
    assert!(ctx.storage.list(1).await.unwrap().is_empty());
    assert!(
        ctx.storage
            .due_before(DueAt::from_utc(utc("2025-08-15 11:00")))
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn future_reminders_are_left_alone() {
    let ctx = TestContext::new();
    let future = ctx.add(1, "Later", "2025-08-15 11:01").await;

    let report = ctx.dispatcher.run_cycle(utc("2025-08-15 11:00")).await;

    assert!(report.is_empty());
    assert!(ctx.channel.sent().is_empty());
    assert_eq!(ctx.storage.list(1).await.unwrap(), [future]);
}

#[tokio::test]
async fn seconds_past_the_minute_still_count_as_due() {
    let ctx = TestContext::new();
    ctx.add(1, "Call Bob", "2025-08-15 11:00").await;
    let now = utc("2025-08-15 11:00") + TimeDelta::seconds(30);

    let report = ctx.dispatcher.run_cycle(now).await;

    assert_eq!(report.delivered, 1);
}

#[tokio::test]
async fn failed_delivery_keeps_reminder_and_does_not_block_others() {
    let ctx = TestContext::new();
    let failing = ctx.add(1, "Unreachable", "2025-08-15 10:00").await;
    ctx.add(2, "Reachable", "2025-08-15 10:30").await;
    ctx.channel.fail_for(1);

    let report = ctx.dispatcher.run_cycle(utc("2025-08-15 11:00")).await;

    assert_eq!(report.delivered, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(ctx.channel.sent(), [(2, "⏰ Reminder: Reachable".to_string())]);

    let kept = ctx.storage.list(1).await.unwrap();
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].id, failing.id);
    assert_eq!(kept[0].text, failing.text);
    assert_eq!(kept[0].due_at, failing.due_at);
    assert!(ctx.storage.list(2).await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_delivery_is_retried_next_cycle() {
    let ctx = TestContext::new();
    ctx.add(1, "Flaky", "2025-08-15 10:00").await;
    ctx.channel.fail_for(1);
    ctx.dispatcher.run_cycle(utc("2025-08-15 11:00")).await;

    ctx.channel.recover(1);
    let report = ctx.dispatcher.run_cycle(utc("2025-08-15 11:01")).await;

    assert_eq!(report.delivered, 1);
    assert!(ctx.storage.list(1).await.unwrap().is_empty());
}

#[tokio::test]
async fn reminder_is_abandoned_after_max_attempts() {
    let ctx = TestContext::new();
    ctx.add(1, "Never arrives", "2025-08-15 10:00").await;
    ctx.channel.fail_for(1);

    let first = ctx.dispatcher.run_cycle(utc("2025-08-15 11:00")).await;
    let second = ctx.dispatcher.run_cycle(utc("2025-08-15 11:01")).await;
    assert_eq!(first.failed, 1);
    assert_eq!(second.failed, 1);
    assert_eq!(ctx.storage.list(1).await.unwrap().len(), 1);

    let third = ctx.dispatcher.run_cycle(utc("2025-08-15 11:02")).await;

    assert_eq!(third.abandoned, 1);
    assert!(ctx.storage.list(1).await.unwrap().is_empty());
    assert!(ctx.channel.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn hanging_delivery_times_out() {
    let ctx = TestContext::new();
    ctx.add(1, "Stuck", "2025-08-15 10:00").await;
    ctx.add(2, "Fine", "2025-08-15 10:30").await;
    ctx.channel.hang_for(1);

    let started = Instant::now();
    let report = ctx.dispatcher.run_cycle(utc("2025-08-15 11:00")).await;

    assert_eq!(report.failed, 1);
    assert_eq!(report.delivered, 1);
    assert_eq!(ctx.channel.sent(), [(2, "⏰ Reminder: Fine".to_string())]);
    assert!(started.elapsed() < Duration::from_secs(11));
    assert_eq!(ctx.storage.list(1).await.unwrap()[0].failed_deliveries, 1);
}

#[tokio::test(start_paused = true)]
async fn cycle_never_outlives_interval() {
    let ctx = TestContext::with_settings(DispatchSettings {
        interval: Duration::from_secs(25),
        delivery_timeout: Duration::from_secs(10),
        max_delivery_attempts: 3,
    });
    for minute in 0..5 {
        ctx.add(1, "Stuck", &format!("2025-08-15 10:0{minute}")).await;
    }
    ctx.add(2, "Fine", "2025-08-15 10:30").await;
    ctx.channel.hang_for(1);

    let started = Instant::now();
    let report = ctx.dispatcher.run_cycle(utc("2025-08-15 11:00")).await;

    assert!(started.elapsed() <= Duration::from_secs(25));
    assert_eq!(report.failed, 3);
    assert_eq!(report.deferred, 3);
    assert_eq!(ctx.storage.list(1).await.unwrap().len(), 5);
    assert_eq!(ctx.storage.list(2).await.unwrap().len(), 1);
}

#[tokio::test]
async fn shutdown_stops_between_reminders() {
    let ctx = TestContext::new();
    ctx.add(1, "a", "2025-08-15 10:00").await;
    ctx.add(1, "b", "2025-08-15 10:01").await;
    ctx.shutdown.cancel();

    let report = ctx.dispatcher.run_cycle(utc("2025-08-15 11:00")).await;

    assert_eq!(report.deferred, 2);
    assert!(ctx.channel.sent().is_empty());
    assert_eq!(ctx.storage.list(1).await.unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn run_delivers_on_every_tick_until_shutdown() {
    let ctx = TestContext::new();
    let past = DueAt::from_utc(Utc::now() - TimeDelta::minutes(1)).to_storage_string();
    ctx.add(1, "first", &past).await;

    let TestContext {
        storage,
        channel,
        shutdown,
        dispatcher,
    } = ctx;
    let handle = dispatcher.spawn();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(channel.sent().len(), 1);

    storage
        .add(NewReminder {
            owner: 2,
            text: "second".to_string(),
            due_at: DueAt::parse_storage(&past).unwrap(),
        })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(channel.sent().len(), 2);

    shutdown.cancel();
    handle.await.unwrap();
}

fn tokio_ct(
    future: impl std::future::Future<Output = Result<(), TestCaseError>>,
) -> Result<(), TestCaseError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .start_paused(true)
        .build()
        .unwrap()
        .block_on(future)
}

#[proptest(async = tokio_ct)]
async fn cycle_delivers_exactly_due_reminders_of_reachable_owners(
    #[strategy(proptest::collection::vec((1i64..=4, -120i64..120), 0..30))]
    reminders: Vec<(OwnerId, i64)>,
    #[strategy(proptest::collection::hash_set(1i64..=4, 0..4))]
    unreachable: HashSet<OwnerId>,
) {
    let ctx = TestContext::new();
    let now = utc("2025-08-15 11:00");
    for owner in &unreachable {
        ctx.channel.fail_for(*owner);
    }

    let mut expected_sent = 0;
    let mut expected_kept = 0;
    for (owner, minutes) in &reminders {
        let due_at = DueAt::from_utc(now + TimeDelta::minutes(*minutes));
        ctx.storage
            .add(NewReminder {
                owner: *owner,
                text: format!("{owner}/{minutes}"),
                due_at,
            })
            .await
            .unwrap();

        if *minutes <= 0 && !unreachable.contains(owner) {
            expected_sent += 1;
        } else {
            expected_kept += 1;
        }
    }

    let report = ctx.dispatcher.run_cycle(now).await;

    let mut kept = 0;
    for owner in 1..=4 {
        kept += ctx.storage.list(owner).await.unwrap().len();
    }
    prop_assert_eq!(report.delivered, expected_sent);
    prop_assert_eq!(ctx.channel.sent().len(), expected_sent);
    prop_assert_eq!(kept, expected_kept);
    prop_assert!(
        ctx.channel
            .sent()
            .iter()
            .all(|(owner, _)| !unreachable.contains(owner))
    );
}
