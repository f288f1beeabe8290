//! Streaming aggregation of base-resolution samples into target-resolution candles.
//!
//! A [`CandleSeries`] holds every candle of one (instrument, duration) pair. Only the
//! newest candle can be open; everything before it is sealed and never changes again.
//! Samples arrive in time order through [`CandleSeries::build_candle`]:
//!
//! - a sample in the open candle's period updates it in place;
//! - a sample in a later period seals the open candle and starts a new one;
//! - a sample with the same timestamp as the previous sample revises it, removing the
//!   earlier contribution before adding the new one;
//! - anything older is reported as [`BuildOutcome::Stale`] and ignored.
//!
//! With a rollup ratio above one, volume and trade count accumulate across samples and
//! the candle VWAP is `Σ(volume × price) / Σ(volume)` over two [`RollingWindow`]s of
//! capacity `rollup_ratio`. With a ratio of one each sample already is a full candle,
//! so its values are copied.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

use crate::{
    bucket::SessionAnchor,
    candle::{BarSample, Candle},
    indicators::Indicator,
    rolling_window::{RollingWindow, WindowError},
    tz::TzError,
};

/// Contract violations raised by [`CandleSeries`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SeriesError {
    /// A candle of another duration was offered to the series.
    #[error("series holds {expected}s candles, got a {found}s candle")]
    MixedPeriod {
        /// Duration of the series.
        expected: u32,
        /// Duration offered.
        found: u32,
    },
    /// The rollup ratio changed while the series holds data.
    #[error("series is bound to rollup ratio {bound}, got {found}")]
    MixedRollup {
        /// Ratio the series was built with.
        bound: u32,
        /// Ratio offered.
        found: u32,
    },
    /// The rollup ratio is zero or does not divide the series duration.
    #[error("rollup ratio {ratio} does not divide a {duration}s period")]
    InvalidRollup {
        /// Ratio offered.
        ratio: u32,
        /// Duration of the series.
        duration: u32,
    },
    /// Window construction failed.
    #[error(transparent)]
    Window(#[from] WindowError),
    /// The session anchor could not be resolved.
    #[error(transparent)]
    Tz(#[from] TzError),
}

/// What a sample did to the series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    /// The sample opened a new period; the previous candle is now sealed.
    NewPeriod,
    /// The sample was folded into the open candle.
    Updated,
    /// The sample replaced the previous sample with the same timestamp.
    Revised,
    /// The sample predates the open candle or the previous sample and was ignored.
    Stale,
}

impl BuildOutcome {
    /// `true` when a new period began.
    pub fn is_new_period(self) -> bool {
        matches!(self, BuildOutcome::NewPeriod)
    }
}

/// Percent change of a sealed candle's close against two session references.
///
/// `None` means the reference was missing or zero, which is distinct from a change of
/// exactly `0.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentChange {
    /// Period of the candle this change belongs to.
    pub period_start: DateTime<Utc>,
    /// Change against the open of the first candle of the same local session date.
    pub from_session_open: Option<f64>,
    /// Change against the close of the last candle of the previous session date.
    pub from_prior_close: Option<f64>,
}

#[derive(Debug, Clone, Copy)]
struct LastSample {
    time: DateTime<Utc>,
    volume: f64,
    trade_count: u64,
}

#[derive(Debug, Clone)]
struct VwapWindow {
    volume: RollingWindow<f64>,
    notional: RollingWindow<f64>,
}

impl VwapWindow {
    fn new(capacity: usize) -> Result<Self, WindowError> {
        Ok(Self {
            volume: RollingWindow::new(capacity)?,
            notional: RollingWindow::new(capacity)?,
        })
    }

    fn push(&mut self, s: &BarSample) {
        self.volume.push(s.volume);
        self.notional.push(s.volume * s.weighted_price());
    }

    fn revise(&mut self, s: &BarSample) {
        self.volume.replace_last(s.volume);
        self.notional.replace_last(s.volume * s.weighted_price());
    }

    fn clear(&mut self) {
        self.volume.clear();
        self.notional.clear();
    }

    /// Falls back to the sample price while no volume has traded.
    fn vwap_or(&self, s: &BarSample) -> f64 {
        let volume = self.volume.sum();
        if volume > 0.0 {
            self.notional.sum() / volume
        } else {
            s.weighted_price()
        }
    }
}

/// Candles of one instrument at one target duration.
#[derive(Debug)]
pub struct CandleSeries {
    symbol: String,
    duration_seconds: u32,
    anchor: SessionAnchor,
    candles: Vec<Candle>,
    /// Number of leading candles that are sealed.
    closed_len: usize,
    rollup_ratio: Option<u32>,
    vwap: Option<VwapWindow>,
    last_sample: Option<LastSample>,
    /// First candle index of every local session date seen, in order.
    session_starts: Vec<(NaiveDate, usize)>,
    /// One entry per sealed candle.
    percent_changes: Vec<PercentChange>,
    indicators: Vec<Box<dyn Indicator>>,
}

impl CandleSeries {
    /// Empty series of `duration_seconds` candles anchored at `anchor`.
    pub fn new(symbol: impl Into<String>, duration_seconds: u32, anchor: SessionAnchor) -> Self {
        Self {
            symbol: symbol.into(),
            duration_seconds,
            anchor,
            candles: Vec::new(),
            closed_len: 0,
            rollup_ratio: None,
            vwap: None,
            last_sample: None,
            session_starts: Vec::new(),
            percent_changes: Vec::new(),
            indicators: Vec::new(),
        }
    }

    /// Instrument symbol, for logging.
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Candle duration in seconds.
    pub fn duration_seconds(&self) -> u32 {
        self.duration_seconds
    }

    /// Session anchor used for period math.
    pub fn anchor(&self) -> SessionAnchor {
        self.anchor
    }

    /// Ratio bound by the first sample, if any.
    pub fn rollup_ratio(&self) -> Option<u32> {
        self.rollup_ratio
    }

    /// Every candle, sealed ones first, the open one (if any) last.
    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    /// Sealed candles only.
    pub fn closed(&self) -> &[Candle] {
        &self.candles[..self.closed_len]
    }

    /// Number of sealed candles.
    pub fn closed_len(&self) -> usize {
        self.closed_len
    }

    /// The candle still receiving samples.
    pub fn open_candle(&self) -> Option<&Candle> {
        self.candles[self.closed_len..].last()
    }

    /// Number of candles, open one included.
    pub fn len(&self) -> usize {
        self.candles.len()
    }

    /// `true` before the first sample.
    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    /// Percent changes of the sealed candles, in candle order.
    pub fn percent_changes(&self) -> &[PercentChange] {
        &self.percent_changes
    }

    /// Attached indicators, in attach order.
    pub fn indicators(&self) -> &[Box<dyn Indicator>] {
        &self.indicators
    }

    /// Attach an indicator and replay the existing candles through it.
    pub fn attach_indicator(&mut self, mut indicator: Box<dyn Indicator>) {
        indicator.reset();
        for candle in &self.candles {
            indicator.update(candle, true);
        }
        debug!(
            symbol = %self.symbol,
            duration = self.duration_seconds,
            indicator = %indicator.name(),
            replayed = self.candles.len(),
            "indicator attached"
        );
        self.indicators.push(indicator);
    }

    /// Fold one base sample into the series.
    ///
    /// `rollup_ratio` is `duration_seconds / base_seconds`; it is bound by the first
    /// sample and must stay the same until [`clear`](Self::clear).
    pub fn build_candle(
        &mut self,
        sample: &BarSample,
        rollup_ratio: u32,
    ) -> Result<BuildOutcome, SeriesError> {
        self.bind_rollup(rollup_ratio)?;
        let period_start = self.anchor.period_start(sample.time, self.duration_seconds)?;

        if let Some(last) = self.last_sample {
            if sample.time == last.time && self.open_period() == Some(period_start) {
                self.revise_open(sample, last, rollup_ratio);
                self.notify_indicators(false);
                return Ok(BuildOutcome::Revised);
            }
            if sample.time <= last.time {
                trace!(symbol = %self.symbol, time = %sample.time, "stale sample skipped");
                return Ok(BuildOutcome::Stale);
            }
        }

        let outcome = match (self.open_period(), self.candles.last()) {
            (Some(open), _) if period_start < open => BuildOutcome::Stale,
            (Some(open), _) if period_start == open => {
                self.update_open(sample, rollup_ratio);
                BuildOutcome::Updated
            }
            (None, Some(sealed)) if period_start < sealed.period_end() => BuildOutcome::Stale,
            _ => {
                self.start_period(period_start, sample);
                BuildOutcome::NewPeriod
            }
        };

        if outcome == BuildOutcome::Stale {
            trace!(symbol = %self.symbol, time = %sample.time, "sample falls in a sealed period");
            return Ok(outcome);
        }

        self.last_sample = Some(LastSample {
            time: sample.time,
            volume: sample.volume,
            trade_count: sample.trade_count,
        });
        self.notify_indicators(outcome.is_new_period());
        Ok(outcome)
    }

    /// Append an already-built candle (e.g. reloaded from storage) as the new open
    /// candle, sealing the previous one. Candles not strictly after the newest one are
    /// ignored and reported as stale.
    pub fn append_candle(&mut self, candle: Candle) -> Result<BuildOutcome, SeriesError> {
        if candle.duration_seconds != self.duration_seconds {
            return Err(SeriesError::MixedPeriod {
                expected: self.duration_seconds,
                found: candle.duration_seconds,
            });
        }
        if self
            .candles
            .last()
            .is_some_and(|last| candle.period_start < last.period_end())
        {
            return Ok(BuildOutcome::Stale);
        }
        self.seal_open();
        self.record_session_start(candle.period_start);
        self.candles.push(candle);
        if let Some(vwap) = self.vwap.as_mut() {
            vwap.clear();
        }
        self.last_sample = None;
        self.notify_indicators(true);
        Ok(BuildOutcome::NewPeriod)
    }

    /// Seal the open candle if it starts before `boundary`.
    ///
    /// A boundary inside the open period (a session close that is not a multiple of
    /// the candle duration from the anchor) truncates that candle: no later sample can
    /// belong to it. Returns the number of candles sealed by this call.
    pub fn seal_at(&mut self, boundary: DateTime<Utc>) -> usize {
        match self.open_candle() {
            Some(open) if open.period_start < boundary => {
                self.seal_open();
                1
            }
            _ => 0,
        }
    }

    /// Drop every candle and reset attached indicators.
    pub fn clear(&mut self) {
        self.candles.clear();
        self.closed_len = 0;
        self.rollup_ratio = None;
        self.vwap = None;
        self.last_sample = None;
        self.session_starts.clear();
        self.percent_changes.clear();
        for indicator in &mut self.indicators {
            indicator.reset();
        }
    }

    fn bind_rollup(&mut self, ratio: u32) -> Result<(), SeriesError> {
        if ratio == 0 || self.duration_seconds % ratio != 0 {
            return Err(SeriesError::InvalidRollup {
                ratio,
                duration: self.duration_seconds,
            });
        }
        match self.rollup_ratio {
            Some(bound) if bound != ratio => Err(SeriesError::MixedRollup {
                bound,
                found: ratio,
            }),
            Some(_) => Ok(()),
            None => {
                self.vwap = Some(VwapWindow::new(ratio as usize)?);
                self.rollup_ratio = Some(ratio);
                Ok(())
            }
        }
    }

    fn open_period(&self) -> Option<DateTime<Utc>> {
        self.open_candle().map(|c| c.period_start)
    }

    fn start_period(&mut self, period_start: DateTime<Utc>, sample: &BarSample) {
        self.seal_open();
        self.record_session_start(period_start);
        self.candles
            .push(Candle::from_sample(period_start, self.duration_seconds, sample));
        if let Some(vwap) = self.vwap.as_mut() {
            vwap.clear();
            vwap.push(sample);
        }
    }

    fn update_open(&mut self, sample: &BarSample, ratio: u32) {
        let Some(candle) = self.candles[self.closed_len..].last_mut() else {
            return;
        };
        candle.high = candle.high.max(sample.high);
        candle.low = candle.low.min(sample.low);
        candle.close = sample.close;
        candle.last_update_time = sample.time;
        if ratio == 1 {
            candle.volume = sample.volume;
            candle.trade_count = sample.trade_count;
            candle.vwap = sample.weighted_price();
        } else {
            candle.volume += sample.volume;
            candle.trade_count += sample.trade_count;
            if let Some(vwap) = self.vwap.as_mut() {
                vwap.push(sample);
                candle.vwap = vwap.vwap_or(sample);
            }
        }
    }

    fn revise_open(&mut self, sample: &BarSample, previous: LastSample, ratio: u32) {
        let Some(candle) = self.candles[self.closed_len..].last_mut() else {
            return;
        };
        candle.high = candle.high.max(sample.high);
        candle.low = candle.low.min(sample.low);
        candle.close = sample.close;
        if ratio == 1 {
            candle.volume = sample.volume;
            candle.trade_count = sample.trade_count;
            candle.vwap = sample.weighted_price();
        } else {
            candle.volume = candle.volume - previous.volume + sample.volume;
            candle.trade_count = candle
                .trade_count
                .saturating_sub(previous.trade_count)
                .saturating_add(sample.trade_count);
            if let Some(vwap) = self.vwap.as_mut() {
                vwap.revise(sample);
                candle.vwap = vwap.vwap_or(sample);
            }
        }
        self.last_sample = Some(LastSample {
            time: sample.time,
            volume: sample.volume,
            trade_count: sample.trade_count,
        });
    }

    fn seal_open(&mut self) {
        if self.closed_len == self.candles.len() {
            return;
        }
        let idx = self.closed_len;
        self.closed_len = self.candles.len();
        let change = self.percent_change_at(idx);
        self.percent_changes.push(change);
    }

    fn record_session_start(&mut self, period_start: DateTime<Utc>) {
        let date = self.anchor.session_date(period_start);
        if self.session_starts.last().is_none_or(|&(d, _)| d != date) {
            self.session_starts.push((date, self.candles.len()));
        }
    }

    fn percent_change_at(&self, idx: usize) -> PercentChange {
        let candle = &self.candles[idx];
        let pos = self
            .session_starts
            .iter()
            .rposition(|&(_, start)| start <= idx);
        let session_open = pos.map(|p| self.candles[self.session_starts[p].1].open);
        let prior_close = pos
            .filter(|&p| p > 0)
            .map(|p| self.candles[self.session_starts[p].1 - 1].close);
        PercentChange {
            period_start: candle.period_start,
            from_session_open: change_from(candle.close, session_open),
            from_prior_close: change_from(candle.close, prior_close),
        }
    }

    fn notify_indicators(&mut self, new_bar: bool) {
        let Some(candle) = self.candles.last() else {
            return;
        };
        for indicator in &mut self.indicators {
            indicator.update(candle, new_bar);
        }
    }
}

fn change_from(close: f64, reference: Option<f64>) -> Option<f64> {
    reference
        .filter(|r| r.is_finite() && *r != 0.0)
        .map(|r| (close - r) / r)
}
