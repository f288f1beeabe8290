//! Time zone helpers for session anchoring.
//!
//! Sessions are configured as a local wall-clock start (e.g. 09:30) in an IANA zone
//! such as "America/New_York". All period math happens in UTC, so the local anchor has
//! to be resolved to a single instant every day, including on DST transition days:
//! - Ambiguous local times happen during “fall back” when a wall time occurs twice.
//!   The earlier instant wins.
//! - Nonexistent local times happen during “spring forward” when a wall time is skipped.
//!   The time moves forward to the first valid minute.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use thiserror::Error;

/// Longest DST gap a local time is shifted across.
const MAX_GAP_MINUTES: u32 = 120;

/// Failures resolving a local wall-clock time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TzError {
    /// The local time falls into a gap longer than any real DST transition.
    #[error("nonexistent local time {0}")]
    Nonexistent(NaiveDateTime),
}

/// Convert a naive local timestamp in `tz` to UTC.
pub fn from_local_naive(naive: NaiveDateTime, tz: Tz) -> Result<DateTime<Utc>, TzError> {
    use chrono::offset::LocalResult::*;
    match tz.from_local_datetime(&naive) {
        Single(dt) | Ambiguous(dt, _) => Ok(dt.with_timezone(&Utc)),
        None => {
            let mut t = naive;
            for _ in 0..MAX_GAP_MINUTES {
                t += chrono::Duration::minutes(1);
                if let Single(dt) = tz.from_local_datetime(&t) {
                    return Ok(dt.with_timezone(&Utc));
                }
            }
            Err(TzError::Nonexistent(naive))
        }
    }
}
