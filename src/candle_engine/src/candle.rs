//! Candle record and the raw sample it is built from.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// One base-resolution price sample, already decoded from the provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BarSample {
    /// Start time of the base bar (UTC).
    pub time: DateTime<Utc>,
    /// Opening price.
    pub open: f64,
    /// Highest price.
    pub high: f64,
    /// Lowest price.
    pub low: f64,
    /// Closing price.
    pub close: f64,
    /// Traded volume.
    pub volume: f64,
    /// Volume-weighted average price, when the provider supplies one.
    pub vwap: Option<f64>,
    /// Number of trades in the bar.
    pub trade_count: u64,
}

impl BarSample {
    /// Price used for volume weighting: the sample VWAP, or the typical price
    /// `(high + low + close) / 3` when the provider did not send one.
    pub fn weighted_price(&self) -> f64 {
        match self.vwap {
            Some(v) if v.is_finite() && v > 0.0 => v,
            _ => (self.high + self.low + self.close) / 3.0,
        }
    }
}

/// OHLCV + VWAP + trade count for one time bucket of one series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Inclusive start of the period (UTC).
    pub period_start: DateTime<Utc>,
    /// Period length in seconds.
    pub duration_seconds: u32,
    /// First traded price of the period.
    pub open: f64,
    /// Highest price of the period.
    pub high: f64,
    /// Lowest price of the period.
    pub low: f64,
    /// Latest price of the period.
    pub close: f64,
    /// Accumulated volume.
    pub volume: f64,
    /// Volume-weighted average price.
    pub vwap: f64,
    /// Accumulated number of trades.
    pub trade_count: u64,
    /// Time of the last sample folded into this candle.
    pub last_update_time: DateTime<Utc>,
}

impl Candle {
    /// Candle seeded from a single sample.
    pub fn from_sample(period_start: DateTime<Utc>, duration_seconds: u32, s: &BarSample) -> Self {
        Self {
            period_start,
            duration_seconds,
            open: s.open,
            high: s.high,
            low: s.low,
            close: s.close,
            volume: s.volume,
            vwap: s.weighted_price(),
            trade_count: s.trade_count,
            last_update_time: s.time,
        }
    }

    /// Exclusive end of the period.
    pub fn period_end(&self) -> DateTime<Utc> {
        self.period_start + Duration::seconds(i64::from(self.duration_seconds))
    }

    /// `high ≥ max(open, close) ≥ min(open, close) ≥ low`.
    pub fn is_well_formed(&self) -> bool {
        self.high >= self.open.max(self.close)
            && self.open.max(self.close) >= self.open.min(self.close)
            && self.open.min(self.close) >= self.low
    }
}
