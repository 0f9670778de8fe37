//! Store-local calendar dates.
//!
//! Price history is keyed by the calendar date at a fixed UTC+9 offset,
//! regardless of the host time zone. No daylight-saving adjustment applies.

use chrono::{DateTime, Duration, NaiveDate, Utc};

/// Offset of the store-local calendar from UTC, in hours.
pub const STORE_UTC_OFFSET_HOURS: i64 = 9;

/// Returns the store-local calendar date for the instant `at`.
#[must_use]
pub fn date_key(at: DateTime<Utc>) -> NaiveDate {
    (at + Duration::hours(STORE_UTC_OFFSET_HOURS)).date_naive()
}

/// Returns the store-local calendar date for the current instant.
#[must_use]
pub fn today_key() -> NaiveDate {
    date_key(Utc::now())
}
