//! Incremental indicators over a candle stream.
//!
//! Every indicator is fed the newest candle of its series together with a `new_bar`
//! flag. `new_bar == true` means the candle opened a new period and the indicator must
//! advance its windows; `false` means the newest candle was updated in place (a later
//! sample in the same period, or a revised sample) and the indicator revises its newest
//! window entries instead of pushing.
//!
//! Implementations compose [`RollingWindow`](crate::RollingWindow) stages through
//! [`Stage`], so an update never rescans history.

mod moving_average;
mod stage;
mod stochastic;

use std::fmt::Debug;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::candle::Candle;

pub use moving_average::SimpleMovingAverage;
pub use stage::Stage;
pub use stochastic::{Stochastic, StochasticParams};

/// One output value of an indicator, keyed by the candle period it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorPoint {
    /// Start of the candle period this value was computed from.
    pub period_start: DateTime<Utc>,
    /// Main line (e.g. smoothed %K).
    pub value: f64,
    /// Secondary line (e.g. %D) once it has enough history.
    pub signal: Option<f64>,
}

/// Capability shared by every incremental indicator.
pub trait Indicator: Send + Debug {
    /// Short display name, e.g. `"stoch(14,3,3)"`.
    fn name(&self) -> String;

    /// Fold the newest candle in. Returns the point produced or revised by this update,
    /// or `None` while the indicator is still warming up.
    fn update(&mut self, candle: &Candle, new_bar: bool) -> Option<IndicatorPoint>;

    /// All points produced so far, oldest first.
    fn points(&self) -> &[IndicatorPoint];

    /// Number of points produced so far.
    fn len(&self) -> usize {
        self.points().len()
    }

    /// `true` while no point has been produced.
    fn is_empty(&self) -> bool {
        self.points().is_empty()
    }

    /// Newest point.
    fn last(&self) -> Option<&IndicatorPoint> {
        self.points().last()
    }

    /// Drop all state and output.
    fn reset(&mut self);
}

/// Append `point`, or overwrite the newest point when it belongs to the same period.
pub(crate) fn record(points: &mut Vec<IndicatorPoint>, point: IndicatorPoint) -> IndicatorPoint {
    match points.last_mut() {
        Some(last) if last.period_start == point.period_start => *last = point,
        _ => points.push(point),
    }
    point
}
