//! bucket.rs: session-anchored period mapping
//!
//! - Periods are fixed-size and measured in seconds.
//! - Every local trading day has one anchor: the configured start-of-day wall time in
//!   the exchange zone, resolved to UTC with [`from_local_naive`](crate::tz::from_local_naive).
//! - `period_start = anchor + floor((t - anchor) / width) * width`, using Euclidean
//!   division so pre-anchor samples fall into the previous bucket.
//! - Hourly periods anchored on a half hour (09:30) are shifted back 30 minutes so they
//!   align to the clock hour, as charting conventions expect.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Timelike, Utc};
use chrono_tz::Tz;

use crate::tz::{TzError, from_local_naive};

/// Number of seconds in a minute.
pub const SECS_PER_MINUTE: i64 = 60;
/// Number of seconds in an hour.
pub const SECS_PER_HOUR: i64 = 60 * SECS_PER_MINUTE;
/// Number of seconds in a day.
pub const SECS_PER_DAY: i64 = 24 * SECS_PER_HOUR;

/// Start-of-day wall time in an exchange time zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionAnchor {
    start_of_day: NaiveTime,
    tz: Tz,
}

impl SessionAnchor {
    /// Anchor sessions at `start_of_day` local time in `tz`.
    pub const fn new(start_of_day: NaiveTime, tz: Tz) -> Self {
        Self { start_of_day, tz }
    }

    /// Configured local start of day.
    pub const fn start_of_day(&self) -> NaiveTime {
        self.start_of_day
    }

    /// Exchange time zone.
    pub const fn tz(&self) -> Tz {
        self.tz
    }

    /// Local trading date of a UTC instant.
    pub fn session_date(&self, ts: DateTime<Utc>) -> NaiveDate {
        ts.with_timezone(&self.tz).date_naive()
    }

    /// UTC anchor used for periods of `duration_seconds` on the local date of `ts`.
    pub fn anchor_for(
        &self,
        ts: DateTime<Utc>,
        duration_seconds: u32,
    ) -> Result<DateTime<Utc>, TzError> {
        let local = self.session_date(ts).and_time(self.start_of_day);
        let mut anchor = from_local_naive(local, self.tz)?;
        if i64::from(duration_seconds) == SECS_PER_HOUR && self.start_of_day.minute() == 30 {
            anchor -= Duration::minutes(30);
        }
        Ok(anchor)
    }

    /// Start of the `duration_seconds` period containing `ts`.
    pub fn period_start(
        &self,
        ts: DateTime<Utc>,
        duration_seconds: u32,
    ) -> Result<DateTime<Utc>, TzError> {
        let anchor = self.anchor_for(ts, duration_seconds)?;
        Ok(period_start_from(anchor, ts, duration_seconds))
    }
}

/// Index of the period containing `ts`, counted from `anchor` (negative before it).
pub fn period_index(anchor: DateTime<Utc>, ts: DateTime<Utc>, duration_seconds: u32) -> i64 {
    let offset = ts.signed_duration_since(anchor).num_seconds();
    offset.div_euclid(i64::from(duration_seconds.max(1)))
}

/// Start of the period containing `ts` for a given anchor.
pub fn period_start_from(
    anchor: DateTime<Utc>,
    ts: DateTime<Utc>,
    duration_seconds: u32,
) -> DateTime<Utc> {
    let idx = period_index(anchor, ts, duration_seconds);
    anchor + Duration::seconds(idx * i64::from(duration_seconds.max(1)))
}
