//! Rental pricing. Prices are integer minor units in a single currency.

use chrono::{DateTime, Utc};

const SECONDS_PER_DAY: i64 = 86_400;

/// Number of billable days for `[start, end)`: the duration rounded up to
/// whole days, never less than one.
pub fn rental_days(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    let seconds = (end - start).num_seconds();
    if seconds <= 0 {
        return 1;
    }
    let days = (seconds + SECONDS_PER_DAY - 1) / SECONDS_PER_DAY;
    days.max(1)
}

/// Total price at creation time. Snapshotted with the rate and never
/// recomputed afterwards.
pub fn total_price(start: DateTime<Utc>, end: DateTime<Utc>, daily_rate: i64) -> i64 {
    rental_days(start, end) * daily_rate
}
