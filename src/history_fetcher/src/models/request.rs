//! Historical bar requests: the deduplication key, the scheduler's bookkeeping record,
//! and the provider-facing parameters.

use std::{collections::BTreeSet, fmt};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{Instrument, bar_size};

/// Identity of one physical request. Two strategies asking for the same key share a
/// single fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestKey {
    pub instrument: Instrument,
    pub session_date: NaiveDate,
    pub bar_seconds: u32,
    pub lookback_days: u32,
}

/// Why a request exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    /// Bars for a strategy's own chart.
    Direct,
    /// Bars for an indicator computed on another instrument.
    Indicator,
    /// Lower-resolution bars refining the newest candles.
    Backfill,
}

/// A series is keyed by instrument, candle duration and the base bar size feeding it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesKey {
    pub instrument: Instrument,
    pub target_seconds: u32,
    pub base_seconds: u32,
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} from {}",
            self.instrument,
            bar_size::label(self.target_seconds),
            bar_size::label(self.base_seconds)
        )
    }
}

/// Scheduler record for one deduplicated request.
#[derive(Debug, Clone, PartialEq)]
pub struct BarRequest {
    pub key: RequestKey,
    pub kind: RequestKind,
    /// End of the requested window (the session close).
    pub end: DateTime<Utc>,
    /// Candle durations this request feeds.
    pub targets: BTreeSet<u32>,
    /// Ids of the strategies sharing this request.
    pub consumers: BTreeSet<u64>,
    /// Parameters were adjusted during validation.
    pub dirty: bool,
}

impl BarRequest {
    pub fn instrument(&self) -> &Instrument {
        &self.key.instrument
    }

    /// Series fed by this request, one per target duration.
    pub fn series_keys(&self) -> impl Iterator<Item = SeriesKey> + '_ {
        self.targets.iter().map(|&target| SeriesKey {
            instrument: self.key.instrument.clone(),
            target_seconds: target,
            base_seconds: self.key.bar_seconds,
        })
    }
}

/// What the provider should return for each bar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WhatToShow {
    #[default]
    Trades,
    Midpoint,
    Bid,
    Ask,
}

/// Parameters of one provider call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalRequest {
    pub request_id: u64,
    pub instrument: Instrument,
    /// Bars strictly before this instant are returned.
    pub end_time: DateTime<Utc>,
    pub duration_days: u32,
    pub bar_seconds: u32,
    pub what_to_show: WhatToShow,
    /// Regular trading hours only.
    pub use_rth: bool,
    /// 1 = formatted timestamps, 2 = epoch seconds.
    pub date_format: u8,
}

impl HistoricalRequest {
    /// Inclusive start of the requested window.
    pub fn start_time(&self) -> DateTime<Utc> {
        self.end_time - chrono::Duration::days(i64::from(self.duration_days))
    }
}

impl fmt::Display for HistoricalRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} {} x {}d ending {}",
            self.request_id,
            self.instrument,
            bar_size::label(self.bar_seconds),
            self.duration_days,
            self.end_time.format("%Y%m%d %H:%M:%S")
        )
    }
}
