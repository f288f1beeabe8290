//! File-backed provider replaying recorded bars.
//!
//! Bars for one instrument and bar size live in `<dir>/<SYMBOL>_<bar_seconds>.json`
//! as a JSON array of [`Bar`]. A request returns the bars whose timestamp falls in
//! `[end - duration_days, end)`. A missing file answers like the live endpoint does
//! when it has nothing: error 162 with a "no data" message.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use shared_utils::env::get_env_var;
use snafu::{ResultExt, ensure};
use tracing::debug;

use super::{
    ApiSnafu, CODE_HISTORICAL_DATA, DataProvider, MissingEnvVarSnafu, ProviderError,
    ProviderInitError, ReplayDecodeSnafu, ReplayDirSnafu, ReplayReadSnafu,
};
use crate::models::{Bar, HistoricalRequest};

/// Environment variable naming the default replay directory.
pub const BARS_DIR_ENV: &str = "HISTORY_FETCHER_BARS_DIR";

/// Serves [`HistoricalRequest`]s from recorded JSON files.
#[derive(Debug, Clone)]
pub struct ReplayProvider {
    dir: PathBuf,
}

impl ReplayProvider {
    /// Replay from `dir`, which must exist.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, ProviderInitError> {
        let dir = dir.into();
        ensure!(dir.is_dir(), ReplayDirSnafu { path: dir });
        Ok(Self { dir })
    }

    /// Replay from the directory named by `HISTORY_FETCHER_BARS_DIR`.
    pub fn from_env() -> Result<Self, ProviderInitError> {
        let dir = get_env_var(BARS_DIR_ENV).context(MissingEnvVarSnafu)?;
        Self::new(dir)
    }

    /// Directory bars are read from.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding bars for `symbol` at `bar_seconds`.
    pub fn file_for(&self, symbol: &str, bar_seconds: u32) -> PathBuf {
        self.dir.join(format!("{symbol}_{bar_seconds}.json"))
    }
}

#[async_trait]
impl DataProvider for ReplayProvider {
    async fn fetch_history(&self, request: &HistoricalRequest) -> Result<Vec<Bar>, ProviderError> {
        let path = self.file_for(&request.instrument.symbol, request.bar_seconds);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return ApiSnafu {
                    code: CODE_HISTORICAL_DATA,
                    message: format!("HMDS query returned no data: {}", request.instrument),
                }
                .fail();
            }
            Err(e) => return Err(e).context(ReplayReadSnafu { path }),
        };
        let bars: Vec<Bar> =
            serde_json::from_slice(&raw).context(ReplayDecodeSnafu { path: &path })?;

        let (start, end) = (request.start_time(), request.end_time);
        let window: Vec<Bar> = bars
            .into_iter()
            .filter(|b| b.timestamp >= start && b.timestamp < end)
            .collect();
        debug!(
            request_id = request.request_id,
            symbol = %request.instrument.symbol,
            bars = window.len(),
            file = %path.display(),
            "replayed bars"
        );
        Ok(window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{Instrument, WhatToShow},
        providers::ErrorClass,
    };
    use chrono::{Duration, TimeZone, Utc};

    fn request(symbol: &str, days: u32) -> HistoricalRequest {
        HistoricalRequest {
            request_id: 7,
            instrument: Instrument::stock(symbol),
            end_time: Utc.with_ymd_and_hms(2024, 1, 16, 21, 0, 0).unwrap(),
            duration_days: days,
            bar_seconds: 60,
            what_to_show: WhatToShow::Trades,
            use_rth: true,
            date_format: 1,
        }
    }

    fn bar(ts: chrono::DateTime<Utc>) -> Bar {
        Bar {
            timestamp: ts,
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 1.0,
            trade_count: None,
            vwap: None,
        }
    }

    #[tokio::test]
    async fn filters_to_request_window() {
        let dir = tempfile::tempdir().unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 16, 21, 0, 0).unwrap();
        let bars = vec![
            bar(end - Duration::days(2)),
            bar(end - Duration::hours(3)),
            bar(end - Duration::minutes(1)),
            bar(end),
        ];
        std::fs::write(
            dir.path().join("AAPL_60.json"),
            serde_json::to_vec(&bars).unwrap(),
        )
        .unwrap();

        let provider = ReplayProvider::new(dir.path()).unwrap();
        let got = provider.fetch_history(&request("AAPL", 1)).await.unwrap();
        assert_eq!(got, bars[1..3].to_vec());
    }

    #[tokio::test]
    async fn missing_file_is_no_data() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ReplayProvider::new(dir.path()).unwrap();
        let err = provider.fetch_history(&request("MSFT", 1)).await.unwrap_err();
        assert_eq!(err.code(), CODE_HISTORICAL_DATA);
        assert_eq!(err.class(), ErrorClass::NoData);
    }

    #[tokio::test]
    async fn garbage_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("AAPL_60.json"), b"not json").unwrap();
        let provider = ReplayProvider::new(dir.path()).unwrap();
        let err = provider.fetch_history(&request("AAPL", 1)).await.unwrap_err();
        assert!(matches!(err, ProviderError::ReplayDecode { .. }));
        assert_eq!(err.class(), ErrorClass::Fatal);
    }

    #[test]
    fn missing_dir_is_rejected() {
        assert!(matches!(
            ReplayProvider::new("/definitely/not/here"),
            Err(ProviderInitError::ReplayDir { .. })
        ));
    }
}
