#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use history_fetcher::{
    models::{Bar, HistoricalRequest, Instrument, Session, TradeStrategy},
    providers::{ApiSnafu, DataProvider, DisconnectedSnafu, ProviderError},
};
use tokio::time::{Duration, Instant, sleep};

/// What the scripted provider answers for a symbol.
#[derive(Debug, Clone)]
pub enum Reply {
    Bars(Vec<Bar>),
    Api(i32, &'static str),
    Disconnected,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub at: Instant,
    pub request: HistoricalRequest,
}

/// Provider that answers from a per-symbol script after a fixed delay and records
/// every call. Symbols without a script get an empty bar list.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    delay: Duration,
    replies: HashMap<String, Reply>,
    calls: Mutex<Vec<Call>>,
    active: Mutex<HashSet<Instrument>>,
    overlap: AtomicBool,
}

impl ScriptedProvider {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn reply(mut self, symbol: &str, reply: Reply) -> Self {
        self.replies.insert(symbol.to_string(), reply);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Two calls for one instrument were outstanding at the same time.
    pub fn saw_overlap(&self) -> bool {
        self.overlap.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataProvider for ScriptedProvider {
    async fn fetch_history(&self, request: &HistoricalRequest) -> Result<Vec<Bar>, ProviderError> {
        self.calls.lock().unwrap().push(Call {
            at: Instant::now(),
            request: request.clone(),
        });
        if !self.active.lock().unwrap().insert(request.instrument.clone()) {
            self.overlap.store(true, Ordering::SeqCst);
        }

        sleep(self.delay).await;

        self.active.lock().unwrap().remove(&request.instrument);
        match self.replies.get(&request.instrument.symbol) {
            None => Ok(Vec::new()),
            Some(Reply::Bars(bars)) => Ok(bars.clone()),
            Some(Reply::Api(code, message)) => ApiSnafu {
                code: *code,
                message: *message,
            }
            .fail(),
            Some(Reply::Disconnected) => DisconnectedSnafu {
                message: "socket closed",
            }
            .fail(),
        }
    }
}

pub fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
}

/// Regular New York session on 2024-01-`day` (winter, UTC-5).
pub fn session(day: u32, strategies: Vec<TradeStrategy>) -> Session {
    Session {
        date: date(day),
        open: Utc.with_ymd_and_hms(2024, 1, day, 14, 30, 0).unwrap(),
        close: Utc.with_ymd_and_hms(2024, 1, day, 21, 0, 0).unwrap(),
        strategies,
    }
}

pub fn strategy(id: u64, symbol: &str, bar_seconds: u32, chart_days: u32) -> TradeStrategy {
    TradeStrategy {
        id,
        instrument: Instrument::stock(symbol),
        bar_seconds,
        chart_days,
        indicators: vec![],
    }
}

/// `count` consecutive bars of `bar_seconds` starting at `start`, drifting upward.
pub fn bars(start: DateTime<Utc>, bar_seconds: i64, count: usize) -> Vec<Bar> {
    (0..count)
        .map(|i| {
            let base = 100.0 + i as f64 * 0.25;
            Bar {
                timestamp: start + chrono::Duration::seconds(bar_seconds * i as i64),
                open: base,
                high: base + 0.5,
                low: base - 0.5,
                close: base + 0.25,
                volume: 1_000.0,
                trade_count: Some(10),
                vwap: None,
            }
        })
        .collect()
}
