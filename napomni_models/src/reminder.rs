use std::fmt;

use chrono::{DateTime, Datelike, NaiveDateTime, TimeDelta, Timelike, Utc};

pub type ReminderId = i64;

/// Chat the reminder belongs to and is delivered to.
pub type OwnerId = i64;

/// Storage representation of [`DueAt`]. Sorts lexicographically in time order.
pub const STORAGE_FORMAT: &str = "%Y-%m-%d %H:%M";

// Years outside this range do not fit the four digit storage form.
const YEAR_RANGE: std::ops::RangeInclusive<i32> = 0..=9999;

/// Point in time a reminder becomes due, always in UTC and with minute precision.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DueAt(NaiveDateTime);

impl DueAt {
    pub fn new(utc: NaiveDateTime) -> Self {
        let normalized = utc
            .with_second(0)
            .and_then(|time| time.with_nanosecond(0))
            .expect("Zero seconds and nanoseconds are always valid.");
        Self(normalized)
    }

    pub fn from_utc(datetime: DateTime<Utc>) -> Self {
        Self::new(datetime.naive_utc())
    }

    pub fn naive_utc(&self) -> &NaiveDateTime {
        &self.0
    }

    pub fn into_naive_utc(self) -> NaiveDateTime {
        self.0
    }

    /// Like [`DueAt::new`], but `None` outside the years 0000 to 9999.
    pub fn checked_new(utc: NaiveDateTime) -> Option<Self> {
        YEAR_RANGE.contains(&utc.year()).then(|| Self::new(utc))
    }

    pub fn checked_add(self, delta: TimeDelta) -> Option<Self> {
        self.0.checked_add_signed(delta).and_then(Self::checked_new)
    }

    pub fn to_storage_string(&self) -> String {
        self.0.format(STORAGE_FORMAT).to_string()
    }

    pub fn parse_storage(value: &str) -> Result<Self, chrono::ParseError> {
        NaiveDateTime::parse_from_str(value, STORAGE_FORMAT).map(Self::new)
    }
}

impl fmt::Display for DueAt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} UTC", self.0.format(STORAGE_FORMAT))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reminder {
    pub id: ReminderId,
    pub owner: OwnerId,
    pub text: String,
    pub due_at: DueAt,
    pub failed_deliveries: u32,
}

impl Reminder {
    pub fn is_due(&self, now: DueAt) -> bool {
        self.due_at <= now
    }
}
