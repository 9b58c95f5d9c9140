//! Conversion between what users type (`DD.MM.YYYY HH:MM`, their local time)
//! and the canonical UTC [`DueAt`] kept in storage.
//!
//! Local time is modelled as a single fixed UTC offset. There is no timezone
//! database behind it, so daylight saving changes are not followed.

use chrono::{FixedOffset, NaiveDateTime, TimeDelta, TimeZone, Utc};
use thiserror::Error;

use crate::reminder::DueAt;

pub const INPUT_FORMAT: &str = "%d.%m.%Y %H:%M";
pub const INPUT_EXAMPLE: &str = "15.08.2025 14:00 Call Bob";

const TOKEN_SHAPE: &str = "99.99.9999 99:99";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("Expected DD.MM.YYYY HH:MM <text>, for example: 15.08.2025 14:00 Call Bob")]
    Pattern,

    #[error("Reminder text is missing. Expected DD.MM.YYYY HH:MM <text>")]
    MissingText,

    #[error("{0} is not a valid date. Expected DD.MM.YYYY HH:MM")]
    InvalidDateTime(String),

    #[error("{0} is outside the supported range of years 0000 to 9999 in UTC")]
    OutOfRange(String),

    #[error("{0} is not a valid duration. Expected something like 10m, 1h or 1d")]
    InvalidDuration(String),

    #[error("UTC offset of {0} minutes is out of range")]
    InvalidOffset(i32),
}

/// Splits `DD.MM.YYYY HH:MM <text>` into the local timestamp and the text.
pub fn parse(input: &str) -> Result<(NaiveDateTime, &str), FormatError> {
    let (local, text) = split_datetime(input)?;
    if text.is_empty() {
        return Err(FormatError::MissingText);
    }

    Ok((local, text))
}

/// Like [`parse`], but the text after the timestamp may be empty.
pub fn split_datetime(input: &str) -> Result<(NaiveDateTime, &str), FormatError> {
    let input = input.trim_start();
    let token = input
        .get(..TOKEN_SHAPE.len())
        .filter(|token| has_token_shape(token))
        .ok_or(FormatError::Pattern)?;

    let rest = &input[TOKEN_SHAPE.len()..];
    if rest.chars().next().is_some_and(|c| !c.is_whitespace()) {
        return Err(FormatError::Pattern);
    }

    let local = NaiveDateTime::parse_from_str(token, INPUT_FORMAT)
        .map_err(|_| FormatError::InvalidDateTime(token.to_string()))?;

    Ok((local, rest.trim()))
}

fn has_token_shape(token: &str) -> bool {
    token
        .bytes()
        .zip(TOKEN_SHAPE.bytes())
        .all(|(c, shape)| match shape {
            b'9' => c.is_ascii_digit(),
            delimiter => c == delimiter,
        })
}

/// Fails when the UTC time falls outside the years 0000 to 9999.
pub fn to_canonical(local: NaiveDateTime, offset: FixedOffset) -> Result<DueAt, FormatError> {
    local
        .checked_sub_signed(TimeDelta::seconds(offset.local_minus_utc().into()))
        .and_then(DueAt::checked_new)
        .ok_or_else(|| FormatError::OutOfRange(local.format(INPUT_FORMAT).to_string()))
}

pub fn to_display(due_at: DueAt, offset: FixedOffset) -> String {
    Utc.from_utc_datetime(due_at.naive_utc())
        .with_timezone(&offset)
        .format(INPUT_FORMAT)
        .to_string()
}

/// Parses snooze tokens such as `10m`, `1h` or `1d`.
pub fn parse_snooze(token: &str) -> Result<TimeDelta, FormatError> {
    let token = token.trim();
    let invalid = || FormatError::InvalidDuration(token.to_string());

    let unit_at = token.len().checked_sub(1).ok_or_else(invalid)?;
    if !token.is_char_boundary(unit_at) {
        return Err(invalid());
    }
    let (amount, unit) = token.split_at(unit_at);

    if amount.is_empty() || !amount.bytes().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    let amount: i64 = amount.parse().map_err(|_| invalid())?;
    if amount == 0 {
        return Err(invalid());
    }

    let delta = match unit {
        "m" => TimeDelta::try_minutes(amount),
        "h" => TimeDelta::try_hours(amount),
        "d" => TimeDelta::try_days(amount),
        _ => None,
    };

    delta.ok_or_else(invalid)
}

/// Fixed-offset clock of the bot's users.
#[derive(Debug, Clone, Copy)]
pub struct TimeNormalizer {
    offset: FixedOffset,
}

impl TimeNormalizer {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn from_offset_minutes(minutes: i32) -> Result<Self, FormatError> {
        minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .map(Self::new)
            .ok_or(FormatError::InvalidOffset(minutes))
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn to_canonical(&self, local: NaiveDateTime) -> Result<DueAt, FormatError> {
        to_canonical(local, self.offset)
    }

    pub fn to_display(&self, due_at: DueAt) -> String {
        to_display(due_at, self.offset)
    }
}
