use super::{Indicator, IndicatorPoint, Stage, record};
use crate::{candle::Candle, rolling_window::WindowError};

/// Simple moving average of candle closes.
#[derive(Debug, Clone)]
pub struct SimpleMovingAverage {
    period: usize,
    closes: Stage,
    started: bool,
    points: Vec<IndicatorPoint>,
}

impl SimpleMovingAverage {
    /// Average over the last `period` closes.
    pub fn new(period: usize) -> Result<Self, WindowError> {
        Ok(Self {
            period,
            closes: Stage::new(period)?,
            started: false,
            points: Vec::new(),
        })
    }
}

impl Indicator for SimpleMovingAverage {
    fn name(&self) -> String {
        format!("sma({})", self.period)
    }

    fn update(&mut self, candle: &Candle, new_bar: bool) -> Option<IndicatorPoint> {
        if new_bar || !self.started {
            self.closes.begin_bar();
            self.started = true;
        }
        self.closes.feed(candle.close);
        let value = self.closes.full_mean()?;
        Some(record(
            &mut self.points,
            IndicatorPoint {
                period_start: candle.period_start,
                value,
                signal: None,
            },
        ))
    }

    fn points(&self) -> &[IndicatorPoint] {
        &self.points
    }

    fn reset(&mut self) {
        self.closes.reset();
        self.started = false;
        self.points.clear();
    }
}
