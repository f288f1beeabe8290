//! Persistence seam for sealed candles.
//!
//! The scheduler hands every candle it confirms closed to a [`CandleStore`] once the
//! fetch that produced it completes, and asks the store for the highest request id
//! already used so ids keep increasing across runs.

use async_trait::async_trait;
use candle_engine::Candle;
use indexmap::IndexMap;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::models::SeriesKey;

/// Failures reported by a [`CandleStore`] backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("candle store backend error: {0}")]
    Backend(String),
    #[error("candle for {key} at {period_start} conflicts with a stored candle")]
    Conflict { key: String, period_start: String },
}

#[async_trait]
pub trait CandleStore: Send + Sync {
    /// Persist one sealed candle of `key`.
    async fn persist_closed_candle(&self, key: &SeriesKey, candle: &Candle)
    -> Result<(), StoreError>;

    /// Highest request id any previous run assigned, if any.
    async fn find_max_assigned_request_key(&self) -> Result<Option<u64>, StoreError>;
}

/// In-memory store used by the CLI and tests.
///
/// Re-persisting a candle for the same period is idempotent; a sealed candle never
/// changes, so a differing payload is a [`StoreError::Conflict`].
#[derive(Debug, Default)]
pub struct MemoryCandleStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    series: IndexMap<SeriesKey, Vec<Candle>>,
    max_request_key: Option<u64>,
}

impl MemoryCandleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that reports `max` as the highest request id already assigned.
    pub fn with_max_request_key(max: u64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                series: IndexMap::new(),
                max_request_key: Some(max),
            }),
        }
    }

    /// Copy of every stored series, in first-persisted order.
    pub async fn snapshot(&self) -> IndexMap<SeriesKey, Vec<Candle>> {
        self.inner.lock().await.series.clone()
    }

    /// Number of stored candles across all series.
    pub async fn candle_count(&self) -> usize {
        self.inner.lock().await.series.values().map(Vec::len).sum()
    }
}

#[async_trait]
impl CandleStore for MemoryCandleStore {
    async fn persist_closed_candle(
        &self,
        key: &SeriesKey,
        candle: &Candle,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let candles = inner.series.entry(key.clone()).or_default();
        match candles.binary_search_by(|c| c.period_start.cmp(&candle.period_start)) {
            Ok(i) if candles[i] == *candle => Ok(()),
            Ok(_) => Err(StoreError::Conflict {
                key: key.to_string(),
                period_start: candle.period_start.to_rfc3339(),
            }),
            Err(i) => {
                candles.insert(i, *candle);
                Ok(())
            }
        }
    }

    async fn find_max_assigned_request_key(&self) -> Result<Option<u64>, StoreError> {
        Ok(self.inner.lock().await.max_request_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Instrument;
    use candle_engine::BarSample;
    use chrono::{Duration, TimeZone, Utc};

    fn key() -> SeriesKey {
        SeriesKey {
            instrument: Instrument::stock("AAPL"),
            target_seconds: 300,
            base_seconds: 60,
        }
    }

    fn candle(minute: i64, close: f64) -> Candle {
        let t = Utc.with_ymd_and_hms(2024, 1, 15, 14, 30, 0).unwrap() + Duration::minutes(minute);
        let s = BarSample {
            time: t,
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
            vwap: None,
            trade_count: 1,
        };
        Candle::from_sample(t, 300, &s)
    }

    #[tokio::test]
    async fn keeps_candles_ordered_and_idempotent() {
        let store = MemoryCandleStore::new();
        store.persist_closed_candle(&key(), &candle(5, 2.0)).await.unwrap();
        store.persist_closed_candle(&key(), &candle(0, 1.0)).await.unwrap();
        store.persist_closed_candle(&key(), &candle(5, 2.0)).await.unwrap();

        let snap = store.snapshot().await;
        let closes: Vec<f64> = snap[&key()].iter().map(|c| c.close).collect();
        assert_eq!(closes, vec![1.0, 2.0]);
        assert_eq!(store.candle_count().await, 2);
    }

    #[tokio::test]
    async fn changed_sealed_candle_is_a_conflict() {
        let store = MemoryCandleStore::new();
        store.persist_closed_candle(&key(), &candle(0, 1.0)).await.unwrap();
        let err = store
            .persist_closed_candle(&key(), &candle(0, 9.0))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[tokio::test]
    async fn reports_seeded_request_key() {
        assert_eq!(MemoryCandleStore::new().find_max_assigned_request_key().await.unwrap(), None);
        assert_eq!(
            MemoryCandleStore::with_max_request_key(41)
                .find_max_assigned_request_key()
                .await
                .unwrap(),
            Some(41)
        );
    }
}
