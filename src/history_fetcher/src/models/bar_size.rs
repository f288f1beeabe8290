//! Bar sizes the historical data endpoint accepts, and how far back each may reach.

use candle_engine::bucket::{SECS_PER_DAY, SECS_PER_HOUR, SECS_PER_MINUTE};

/// Supported bar durations in seconds, ascending.
pub const SUPPORTED_BAR_SECONDS: [u32; 12] = [
    1, 5, 15, 30, 60, 120, 180, 300, 900, 1800, 3600, 86400,
];

/// Longest lookback (in days) one request may ask for at `bar_seconds`.
///
/// Unsupported sizes get the limit of the next smaller supported size.
pub fn max_lookback_days(bar_seconds: u32) -> u32 {
    match bar_seconds {
        0..=60 => 1,
        61..=120 => 2,
        121..=300 => 7,
        301..=900 => 14,
        901..=3600 => 30,
        _ => 365,
    }
}

/// Largest supported size not above `bar_seconds` that divides `target_seconds`.
pub fn snap(bar_seconds: u32, target_seconds: u32) -> Option<u32> {
    SUPPORTED_BAR_SECONDS
        .iter()
        .rev()
        .copied()
        .find(|&s| s <= bar_seconds && target_seconds % s == 0)
}

/// Human label for a bar size, e.g. `"5 mins"` or `"1 hour"`.
pub fn label(bar_seconds: u32) -> String {
    let secs = i64::from(bar_seconds);
    let (n, unit) = if secs % SECS_PER_DAY == 0 {
        (secs / SECS_PER_DAY, "day")
    } else if secs % SECS_PER_HOUR == 0 {
        (secs / SECS_PER_HOUR, "hour")
    } else if secs % SECS_PER_MINUTE == 0 {
        (secs / SECS_PER_MINUTE, "min")
    } else {
        (secs, "sec")
    };
    if n == 1 {
        format!("1 {unit}")
    } else {
        format!("{n} {unit}s")
    }
}
