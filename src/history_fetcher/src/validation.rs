//! Pre-submission checks for historical requests.
//!
//! A request is never sent with a bar size the endpoint rejects or a lookback it
//! cannot serve. Instead the bar size is snapped down to the largest supported size
//! that still divides the target candle duration, and the lookback is clamped to the
//! limit for that size. Adjusted requests are flagged dirty and described in
//! [`Validated::corrections`].

use thiserror::Error;

use crate::models::bar_size;

/// Requests that cannot be repaired.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("target candle duration must be positive")]
    ZeroTarget,
    #[error("bar size must be positive")]
    ZeroBarSize,
    #[error("lookback must be at least one day")]
    ZeroLookback,
}

/// Parameters that passed validation, possibly after adjustment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validated {
    pub bar_seconds: u32,
    pub lookback_days: u32,
    /// Human-readable description of every adjustment; empty when nothing changed.
    pub corrections: Vec<String>,
}

impl Validated {
    /// `true` when any parameter was adjusted.
    pub fn is_dirty(&self) -> bool {
        !self.corrections.is_empty()
    }
}

/// Validate and repair one request.
pub fn validate(
    bar_seconds: u32,
    target_seconds: u32,
    lookback_days: u32,
) -> Result<Validated, ValidationError> {
    if target_seconds == 0 {
        return Err(ValidationError::ZeroTarget);
    }
    if bar_seconds == 0 {
        return Err(ValidationError::ZeroBarSize);
    }
    if lookback_days == 0 {
        return Err(ValidationError::ZeroLookback);
    }

    let mut corrections = Vec::new();
    let requested = bar_seconds.min(target_seconds);
    // 1 s is always supported and divides everything, so snapping cannot fail here.
    let snapped = bar_size::snap(requested, target_seconds).unwrap_or(1);
    if snapped != bar_seconds {
        corrections.push(format!(
            "bar size {} replaced by {} for {} candles",
            bar_size::label(bar_seconds),
            bar_size::label(snapped),
            bar_size::label(target_seconds)
        ));
    }

    let limit = bar_size::max_lookback_days(snapped);
    let lookback = lookback_days.min(limit);
    if lookback != lookback_days {
        corrections.push(format!(
            "lookback of {lookback_days} days clamped to {lookback} for {} bars",
            bar_size::label(snapped)
        ));
    }

    Ok(Validated {
        bar_seconds: snapped,
        lookback_days: lookback,
        corrections,
    })
}
