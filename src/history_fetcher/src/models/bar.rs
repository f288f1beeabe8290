//! Canonical in-memory representation of one historical bar (OHLCV).
//!
//! This is what every [`DataProvider`](crate::providers::DataProvider) returns,
//! regardless of where the bars came from.

use candle_engine::BarSample;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single time-series bar for a given timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Start of the bar (UTC).
    pub timestamp: DateTime<Utc>,

    /// Opening price.
    pub open: f64,

    /// Highest price during the bar interval.
    pub high: f64,

    /// Lowest price during the bar interval.
    pub low: f64,

    /// Closing price.
    pub close: f64,

    /// Volume traded during the bar interval.
    pub volume: f64,

    /// Trade count for the bar. Not all providers supply this.
    #[serde(default)]
    pub trade_count: Option<u64>,

    /// Volume-weighted average price. Not all providers supply this.
    #[serde(default)]
    pub vwap: Option<f64>,
}

impl Bar {
    /// Aggregator input for this bar; a missing trade count counts as zero.
    pub fn to_sample(&self) -> BarSample {
        BarSample {
            time: self.timestamp,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
            vwap: self.vwap,
            trade_count: self.trade_count.unwrap_or(0),
        }
    }
}
