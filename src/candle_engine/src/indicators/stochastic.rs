//! Smoothed stochastic oscillator.
//!
//! Three chained stages:
//! 1. the last `length` closes, giving raw %K from the window's max/min;
//! 2. the last `k_smoothing` raw %K values, whose mean is the smoothed %K line;
//! 3. the last `percent_d` smoothed %K values, whose mean is the %D signal line.
//!
//! A stage only receives input once the stage before it is full, so with the default
//! 14/3/3 parameters the first %K point appears on the 16th candle and the first %D on
//! the 18th.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Indicator, IndicatorPoint, Stage, record};
use crate::{candle::Candle, rolling_window::WindowError};

/// Stochastic oscillator parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct StochasticParams {
    /// Look-back length of the close window.
    pub length: usize,
    /// Smoothing period of %K.
    pub k_smoothing: usize,
    /// Period of the %D signal line.
    pub percent_d: usize,
    /// Williams-style inverted form, ranging from -100 to 0.
    pub inverted: bool,
}

impl Default for StochasticParams {
    fn default() -> Self {
        Self {
            length: 14,
            k_smoothing: 3,
            percent_d: 3,
            inverted: false,
        }
    }
}

/// Incremental stochastic oscillator.
#[derive(Debug, Clone)]
pub struct Stochastic {
    params: StochasticParams,
    closes: Stage,
    raw_k: Stage,
    smoothed_k: Stage,
    bar_start: Option<DateTime<Utc>>,
    points: Vec<IndicatorPoint>,
}

impl Stochastic {
    /// Build an oscillator; every period must be non-zero.
    pub fn new(params: StochasticParams) -> Result<Self, WindowError> {
        Ok(Self {
            params,
            closes: Stage::new(params.length)?,
            raw_k: Stage::new(params.k_smoothing)?,
            smoothed_k: Stage::new(params.percent_d)?,
            bar_start: None,
            points: Vec::new(),
        })
    }

    /// Parameters this oscillator was built with.
    pub fn params(&self) -> StochasticParams {
        self.params
    }

    fn raw_percent_k(&self, close: f64) -> Option<f64> {
        if !self.closes.is_full() {
            return None;
        }
        let window = self.closes.window();
        let (max, min) = (window.max()?, window.min()?);
        let range = max - min;
        if range == 0.0 {
            return Some(0.0);
        }
        Some(if self.params.inverted {
            (max - close) / range * -100.0
        } else {
            (close - min) / range * 100.0
        })
    }
}

impl Indicator for Stochastic {
    fn name(&self) -> String {
        let p = self.params;
        let prefix = if p.inverted { "stoch_inv" } else { "stoch" };
        format!("{prefix}({},{},{})", p.length, p.k_smoothing, p.percent_d)
    }

    fn update(&mut self, candle: &Candle, new_bar: bool) -> Option<IndicatorPoint> {
        // The very first candle always opens a bar, whatever the caller says.
        if new_bar || self.bar_start.is_none() {
            self.closes.begin_bar();
            self.raw_k.begin_bar();
            self.smoothed_k.begin_bar();
            self.bar_start = Some(candle.period_start);
        }

        self.closes.feed(candle.close);
        let raw = self.raw_percent_k(candle.close)?;
        self.raw_k.feed(raw);
        let k = self.raw_k.full_mean()?;
        self.smoothed_k.feed(k);
        let d = self.smoothed_k.full_mean();

        Some(record(
            &mut self.points,
            IndicatorPoint {
                period_start: candle.period_start,
                value: k,
                signal: d,
            },
        ))
    }

    fn points(&self) -> &[IndicatorPoint] {
        &self.points
    }

    fn reset(&mut self) {
        self.closes.reset();
        self.raw_k.reset();
        self.smoothed_k.reset();
        self.bar_start = None;
        self.points.clear();
    }
}
