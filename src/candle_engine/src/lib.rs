//! Streaming candle construction and incremental indicators.
//!
//! The crate is organised leaves first:
//! - [`rolling_window`]: fixed-capacity window with O(1) sum/max/min.
//! - [`candle`]: the OHLCV + VWAP record and the raw [`BarSample`](candle::BarSample) input.
//! - [`bucket`] / [`tz`]: session-anchored period math in the exchange time zone.
//! - [`series`]: the bar aggregator turning base samples into target-resolution candles.
//! - [`indicators`]: the [`Indicator`](indicators::Indicator) capability and its implementations.

#![warn(missing_docs)]

pub mod bucket;
pub mod candle;
pub mod indicators;
pub mod rolling_window;
pub mod series;
pub mod tz;

pub use candle::{BarSample, Candle};
pub use rolling_window::{RollingWindow, WindowError};
pub use series::{BuildOutcome, CandleSeries, PercentChange, SeriesError};
