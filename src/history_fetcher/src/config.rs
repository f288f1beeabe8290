//! Fetcher configuration and run plans, both TOML.
//!
//! [`FetcherConfig`] tunes the scheduler: connection mode, pacing windows per mode,
//! in-flight ceiling, the deferred-resubmit cadence, optional backfill, the session
//! anchor used for candle periods, and the fixed request options. Every field has a
//! default, so an empty file is a valid config.
//!
//! [`RunPlan`] lists instruments, strategies and the sessions to fetch, and resolves
//! them into [`Session`]s with UTC open/close instants.
//!
//! Entrypoints:
//! - [`load_config_str`] / [`load_config_path`]
//! - [`resolve_config`]: explicit path, else `HISTORY_FETCHER_CONFIG`, else defaults
//! - [`load_plan_str`] / [`load_plan_path`]

use std::{collections::HashSet, path::Path};

use anyhow::{Context, bail, ensure};
use candle_engine::{
    bucket::SessionAnchor,
    indicators::StochasticParams,
    tz::from_local_naive,
};
use chrono::{NaiveDate, NaiveTime};
use chrono_tz::Tz;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use shared_utils::config::resolve_optional_config_path;
use toml::from_str;
use tracing::debug;

use crate::{
    models::{IndicatorKind, IndicatorSpec, Instrument, SecType, Session, TradeStrategy, WhatToShow},
    pacing::WindowLimit,
};

/// Environment variable naming the config file when no path is passed.
pub const CONFIG_ENV: &str = "HISTORY_FETCHER_CONFIG";

/// Which pacing regime applies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionMode {
    /// Broker gateway with its short and long rolling windows.
    #[default]
    Live,
    /// Vendor feed with a single slow window.
    Offline,
}

/// Deferred requests are revisited every `k` submissions; `k` starts at `initial`
/// and grows by `growth` each time the revisit fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ResubmitPolicy {
    pub initial: usize,
    pub growth: usize,
}

impl Default for ResubmitPolicy {
    fn default() -> Self {
        Self {
            initial: 20,
            growth: 20,
        }
    }
}

/// Local start of day and exchange zone used to anchor candle periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SessionConfig {
    pub start_of_day: NaiveTime,
    pub time_zone: Tz,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            start_of_day: NaiveTime::from_hms_opt(9, 30, 0).unwrap_or_default(),
            time_zone: chrono_tz::America::New_York,
        }
    }
}

impl SessionConfig {
    pub fn anchor(&self) -> SessionAnchor {
        SessionAnchor::new(self.start_of_day, self.time_zone)
    }
}

/// Options copied into every provider request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RequestOptions {
    pub what_to_show: WhatToShow,
    pub use_rth: bool,
    pub date_format: u8,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            what_to_show: WhatToShow::Trades,
            use_rth: true,
            date_format: 1,
        }
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct FetcherConfig {
    pub mode: ConnectionMode,
    /// Pacing windows in [`ConnectionMode::Live`].
    pub live_limits: Vec<WindowLimit>,
    /// Pacing windows in [`ConnectionMode::Offline`].
    pub offline_limits: Vec<WindowLimit>,
    /// Most requests outstanding at once.
    pub max_in_flight: usize,
    pub resubmit: ResubmitPolicy,
    /// When set, strategies with larger candles also fetch bars of this size.
    pub backfill_bar_seconds: Option<u32>,
    /// Interval between "please wait" messages while pacing holds submissions.
    pub wait_notice_secs: u64,
    pub session: SessionConfig,
    pub request: RequestOptions,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            mode: ConnectionMode::Live,
            live_limits: vec![WindowLimit::new(5, 4), WindowLimit::new(58, 600)],
            offline_limits: vec![WindowLimit::new(5, 60)],
            max_in_flight: 8,
            resubmit: ResubmitPolicy::default(),
            backfill_bar_seconds: None,
            wait_notice_secs: 60,
            session: SessionConfig::default(),
            request: RequestOptions::default(),
        }
    }
}

impl FetcherConfig {
    /// Pacing windows of the configured mode.
    pub fn limits(&self) -> &[WindowLimit] {
        match self.mode {
            ConnectionMode::Live => &self.live_limits,
            ConnectionMode::Offline => &self.offline_limits,
        }
    }

    /// Reject values the scheduler cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.max_in_flight > 0, "max_in_flight must be at least 1");
        ensure!(self.resubmit.initial > 0, "resubmit.initial must be at least 1");
        ensure!(self.wait_notice_secs > 0, "wait_notice_secs must be at least 1");
        for limit in self.live_limits.iter().chain(&self.offline_limits) {
            ensure!(
                limit.window_secs > 0,
                "pacing window of {} requests has zero length",
                limit.max_requests
            );
        }
        if let Some(b) = self.backfill_bar_seconds {
            ensure!(b > 0, "backfill_bar_seconds must be positive");
        }
        Ok(())
    }
}

/// Parse and validate a config from TOML text.
pub fn load_config_str(toml_str: &str) -> anyhow::Result<FetcherConfig> {
    let cfg: FetcherConfig = from_str(toml_str).context("failed to parse fetcher config TOML")?;
    cfg.validate().context("invalid fetcher config")?;
    Ok(cfg)
}

/// Read, parse and validate a config file.
pub fn load_config_path(path: impl AsRef<Path>) -> anyhow::Result<FetcherConfig> {
    let text = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("read config file {}", path.as_ref().display()))?;
    load_config_str(&text)
}

/// Load the config from `explicit`, else from the file named by [`CONFIG_ENV`], else
/// fall back to defaults.
pub fn resolve_config(explicit: Option<&Path>) -> anyhow::Result<FetcherConfig> {
    match resolve_optional_config_path(explicit, CONFIG_ENV)? {
        Some(path) => {
            debug!(path = %path.display(), "loading fetcher config");
            load_config_path(path)
        }
        None => Ok(FetcherConfig::default()),
    }
}

// -------------------- run plan --------------------

/// Contract details for one symbol in a [`RunPlan`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct InstrumentCfg {
    pub sec_type: SecType,
    pub exchange: String,
    pub currency: String,
    pub expiry: Option<NaiveDate>,
}

impl Default for InstrumentCfg {
    fn default() -> Self {
        Self {
            sec_type: SecType::Stock,
            exchange: "SMART".to_string(),
            currency: "USD".to_string(),
            expiry: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorName {
    Stochastic,
    Sma,
}

/// Indicator entry of a strategy. Parameters not used by `kind` are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndicatorCfg {
    pub kind: IndicatorName,
    pub length: Option<usize>,
    pub k_smoothing: Option<usize>,
    pub percent_d: Option<usize>,
    #[serde(default)]
    pub inverted: bool,
    pub period: Option<usize>,
    /// Symbol whose candles feed the indicator, when not the strategy's own.
    pub input: Option<String>,
}

impl IndicatorCfg {
    fn kind(&self) -> IndicatorKind {
        match self.kind {
            IndicatorName::Stochastic => {
                let d = StochasticParams::default();
                IndicatorKind::Stochastic(StochasticParams {
                    length: self.length.unwrap_or(d.length),
                    k_smoothing: self.k_smoothing.unwrap_or(d.k_smoothing),
                    percent_d: self.percent_d.unwrap_or(d.percent_d),
                    inverted: self.inverted,
                })
            }
            IndicatorName::Sma => IndicatorKind::Sma {
                period: self.period.unwrap_or(20),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StrategyCfg {
    pub id: u64,
    pub symbol: String,
    pub bar_seconds: u32,
    #[serde(default = "one_day")]
    pub chart_days: u32,
    #[serde(default)]
    pub indicators: Vec<IndicatorCfg>,
}

fn one_day() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionCfg {
    pub date: NaiveDate,
    /// Strategy ids active on this date; all strategies when omitted.
    pub strategies: Option<Vec<u64>>,
}

/// Sessions and strategies to fetch.
///
/// Symbols not listed under `instruments` are SMART-routed USD stocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunPlan {
    #[serde(default = "default_open")]
    pub open: NaiveTime,
    #[serde(default = "default_close")]
    pub close: NaiveTime,
    #[serde(default = "default_tz")]
    pub time_zone: Tz,
    #[serde(default)]
    pub instruments: IndexMap<String, InstrumentCfg>,
    pub strategies: Vec<StrategyCfg>,
    pub sessions: Vec<SessionCfg>,
}

fn default_open() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 30, 0).unwrap_or_default()
}

fn default_close() -> NaiveTime {
    NaiveTime::from_hms_opt(16, 0, 0).unwrap_or_default()
}

fn default_tz() -> Tz {
    chrono_tz::America::New_York
}

impl RunPlan {
    fn instrument(&self, symbol: &str) -> Instrument {
        let symbol = symbol.trim();
        let cfg = self.instruments.get(symbol).cloned().unwrap_or_default();
        Instrument {
            symbol: symbol.to_string(),
            sec_type: cfg.sec_type,
            exchange: cfg.exchange,
            currency: cfg.currency,
            expiry: cfg.expiry,
        }
    }

    fn strategy(&self, cfg: &StrategyCfg) -> TradeStrategy {
        let instrument = self.instrument(&cfg.symbol);
        let indicators = cfg
            .indicators
            .iter()
            .map(|i| IndicatorSpec {
                kind: i.kind(),
                input: i
                    .input
                    .as_deref()
                    .map(|s| self.instrument(s))
                    .filter(|input| *input != instrument),
            })
            .collect();
        TradeStrategy {
            id: cfg.id,
            instrument,
            bar_seconds: cfg.bar_seconds,
            chart_days: cfg.chart_days,
            indicators,
        }
    }

    /// Resolve the plan into sessions with UTC open/close instants, in plan order.
    pub fn sessions(&self) -> anyhow::Result<Vec<Session>> {
        let mut ids = HashSet::new();
        for s in &self.strategies {
            ensure!(ids.insert(s.id), "duplicate strategy id {}", s.id);
            ensure!(!s.symbol.trim().is_empty(), "strategy {} has an empty symbol", s.id);
        }
        ensure!(self.open < self.close, "session open must precede close");

        let mut out = Vec::with_capacity(self.sessions.len());
        for cfg in &self.sessions {
            let open = from_local_naive(cfg.date.and_time(self.open), self.time_zone)
                .with_context(|| format!("session {} open", cfg.date))?;
            let close = from_local_naive(cfg.date.and_time(self.close), self.time_zone)
                .with_context(|| format!("session {} close", cfg.date))?;

            let strategies = match &cfg.strategies {
                None => self.strategies.iter().map(|s| self.strategy(s)).collect(),
                Some(wanted) => {
                    let mut picked = Vec::with_capacity(wanted.len());
                    for id in wanted {
                        let Some(s) = self.strategies.iter().find(|s| s.id == *id) else {
                            bail!("session {} names unknown strategy {id}", cfg.date);
                        };
                        picked.push(self.strategy(s));
                    }
                    picked
                }
            };
            out.push(Session {
                date: cfg.date,
                open,
                close,
                strategies,
            });
        }
        Ok(out)
    }
}

/// Parse a run plan from TOML text.
pub fn load_plan_str(toml_str: &str) -> anyhow::Result<RunPlan> {
    from_str(toml_str).context("failed to parse run plan TOML")
}

/// Read and parse a run plan file.
pub fn load_plan_path(path: impl AsRef<Path>) -> anyhow::Result<RunPlan> {
    let text = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("read run plan {}", path.as_ref().display()))?;
    load_plan_str(&text)
}
