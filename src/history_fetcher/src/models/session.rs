use candle_engine::{
    WindowError,
    indicators::{Indicator, SimpleMovingAverage, Stochastic, StochasticParams},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::Instrument;

/// Indicator type and parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IndicatorKind {
    Stochastic(StochasticParams),
    Sma { period: usize },
}

impl IndicatorKind {
    /// Fresh indicator state for a series.
    pub fn build(&self) -> Result<Box<dyn Indicator>, WindowError> {
        Ok(match *self {
            IndicatorKind::Stochastic(params) => Box::new(Stochastic::new(params)?),
            IndicatorKind::Sma { period } => Box::new(SimpleMovingAverage::new(period)?),
        })
    }
}

/// An indicator a strategy wants, optionally computed on another instrument.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndicatorSpec {
    pub kind: IndicatorKind,
    /// Instrument whose candles feed the indicator; `None` means the strategy's own.
    pub input: Option<Instrument>,
}

/// A strategy's chart requirements for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeStrategy {
    pub id: u64,
    pub instrument: Instrument,
    /// Target candle duration in seconds.
    pub bar_seconds: u32,
    /// How many days of history the chart needs.
    pub chart_days: u32,
    pub indicators: Vec<IndicatorSpec>,
}

/// One trading day and the strategies active on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub date: NaiveDate,
    pub open: DateTime<Utc>,
    pub close: DateTime<Utc>,
    pub strategies: Vec<TradeStrategy>,
}
