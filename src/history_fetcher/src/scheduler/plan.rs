//! Expansion of one session into deduplicated, ordered bar requests.
//!
//! Per strategy the session yields:
//! - one direct request for the strategy's own chart;
//! - one request per indicator whose input is another instrument;
//! - with backfill configured, one lower-resolution request when the strategy's
//!   candles are larger than the backfill bar size.
//!
//! Every raw request is validated (bar size snapped, lookback clamped) before it is
//! keyed, so two strategies that end up asking for the same thing share one request.
//! Requests for the same instrument and bar size also merge when their lookbacks
//! differ: the merged request asks for the longest lookback, since bars of one size
//! feed one series and a second, shorter request would only re-deliver a subset.
//! The result is stably sorted by instrument, direct requests first, which keeps
//! same-instrument requests adjacent.

use std::collections::{BTreeSet, HashSet};

use indexmap::IndexMap;

use crate::{
    models::{BarRequest, IndicatorKind, Instrument, RequestKey, RequestKind, SeriesKey, Session},
    validation::{ValidationError, validate},
};

/// Backfill requests only need the session itself.
const BACKFILL_LOOKBACK_DAYS: u32 = 1;

/// A raw request that failed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejected {
    pub instrument: Instrument,
    pub bar_seconds: u32,
    pub target_seconds: u32,
    pub error: ValidationError,
}

/// Requests and indicator attachments derived from one session.
#[derive(Debug, Clone, Default)]
pub struct ExpandedSession {
    pub requests: Vec<BarRequest>,
    /// Indicators to attach, keyed by the series that feeds them.
    pub attachments: Vec<(SeriesKey, IndicatorKind)>,
    /// Validation corrections, one message each.
    pub corrections: Vec<String>,
    pub rejected: Vec<Rejected>,
}

struct Raw<'a> {
    instrument: &'a Instrument,
    kind: RequestKind,
    bar_seconds: u32,
    target_seconds: u32,
    lookback_days: u32,
    strategy: u64,
    /// Indicators computed on the series this request feeds.
    indicators: Vec<IndicatorKind>,
}

/// Expand `session` into requests. `backfill` is the optional backfill bar size.
pub fn expand_session(session: &Session, backfill: Option<u32>) -> ExpandedSession {
    let mut raws = Vec::new();
    for s in &session.strategies {
        raws.push(Raw {
            instrument: &s.instrument,
            kind: RequestKind::Direct,
            bar_seconds: s.bar_seconds,
            target_seconds: s.bar_seconds,
            lookback_days: s.chart_days,
            strategy: s.id,
            indicators: s
                .indicators
                .iter()
                .filter(|i| i.input.is_none())
                .map(|i| i.kind)
                .collect(),
        });
    }
    for s in &session.strategies {
        for spec in &s.indicators {
            if let Some(input) = &spec.input {
                raws.push(Raw {
                    instrument: input,
                    kind: RequestKind::Indicator,
                    bar_seconds: s.bar_seconds,
                    target_seconds: s.bar_seconds,
                    lookback_days: s.chart_days,
                    strategy: s.id,
                    indicators: vec![spec.kind],
                });
            }
        }
    }
    if let Some(base) = backfill {
        for s in session.strategies.iter().filter(|s| s.bar_seconds > base) {
            raws.push(Raw {
                instrument: &s.instrument,
                kind: RequestKind::Backfill,
                bar_seconds: base,
                target_seconds: s.bar_seconds,
                lookback_days: BACKFILL_LOOKBACK_DAYS,
                strategy: s.id,
                indicators: Vec::new(),
            });
        }
    }

    collect(session, raws)
}

fn collect(session: &Session, raws: Vec<Raw<'_>>) -> ExpandedSession {
    let mut out = ExpandedSession::default();
    let mut requests: IndexMap<(Instrument, u32), BarRequest> = IndexMap::new();
    let mut seen_rejects = HashSet::new();
    let mut seen_attachments = HashSet::new();

    for raw in raws {
        let v = match validate(raw.bar_seconds, raw.target_seconds, raw.lookback_days) {
            Ok(v) => v,
            Err(error) => {
                let reject = (raw.instrument.clone(), raw.bar_seconds, raw.target_seconds);
                if seen_rejects.insert(reject) {
                    out.rejected.push(Rejected {
                        instrument: raw.instrument.clone(),
                        bar_seconds: raw.bar_seconds,
                        target_seconds: raw.target_seconds,
                        error,
                    });
                }
                continue;
            }
        };
        out.corrections.extend(
            v.corrections
                .iter()
                .map(|c| format!("{} {}: {c}", raw.instrument, session.date)),
        );

        let key = RequestKey {
            instrument: raw.instrument.clone(),
            session_date: session.date,
            bar_seconds: v.bar_seconds,
            lookback_days: v.lookback_days,
        };
        let series = SeriesKey {
            instrument: raw.instrument.clone(),
            target_seconds: raw.target_seconds,
            base_seconds: v.bar_seconds,
        };
        for kind in raw.indicators {
            if seen_attachments.insert((series.clone(), kind)) {
                out.attachments.push((series.clone(), kind));
            }
        }

        let merge_key = (raw.instrument.clone(), v.bar_seconds);
        let entry = requests.entry(merge_key).or_insert_with(|| BarRequest {
            key,
            kind: raw.kind,
            end: session.close,
            targets: BTreeSet::new(),
            consumers: BTreeSet::new(),
            dirty: false,
        });
        entry.key.lookback_days = entry.key.lookback_days.max(v.lookback_days);
        entry.kind = entry.kind.min(raw.kind);
        entry.targets.insert(raw.target_seconds);
        entry.consumers.insert(raw.strategy);
        entry.dirty |= v.is_dirty();
    }

    let mut list: Vec<BarRequest> = requests.into_values().collect();
    list.sort_by(|a, b| {
        a.key
            .instrument
            .cmp(&b.key.instrument)
            .then(a.kind.cmp(&b.kind))
    });
    out.requests = list;
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IndicatorSpec, TradeStrategy};
    use candle_engine::indicators::StochasticParams;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn strategy(id: u64, symbol: &str, bar_seconds: u32, chart_days: u32) -> TradeStrategy {
        TradeStrategy {
            id,
            instrument: Instrument::stock(symbol),
            bar_seconds,
            chart_days,
            indicators: vec![],
        }
    }

    fn session(strategies: Vec<TradeStrategy>) -> Session {
        Session {
            date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            open: Utc.with_ymd_and_hms(2024, 1, 15, 14, 30, 0).unwrap(),
            close: Utc.with_ymd_and_hms(2024, 1, 15, 21, 0, 0).unwrap(),
            strategies,
        }
    }

    #[test]
    fn shared_requests_are_deduplicated() {
        let s = session(vec![strategy(1, "AAPL", 300, 2), strategy(2, "AAPL", 300, 2)]);
        let e = expand_session(&s, None);
        assert_eq!(e.requests.len(), 1);
        let r = &e.requests[0];
        assert_eq!(r.consumers, BTreeSet::from([1, 2]));
        assert_eq!(r.end, s.close);
        assert!(!r.dirty);
    }

    #[test]
    fn same_bar_size_merges_to_longest_lookback() {
        let mut aapl = strategy(2, "AAPL", 300, 3);
        aapl.indicators = vec![IndicatorSpec {
            kind: IndicatorKind::Sma { period: 5 },
            input: Some(Instrument::stock("SPY")),
        }];
        let s = session(vec![strategy(1, "SPY", 300, 1), aapl]);
        let e = expand_session(&s, None);

        let spy: Vec<_> = e
            .requests
            .iter()
            .filter(|r| r.instrument().symbol == "SPY")
            .collect();
        assert_eq!(spy.len(), 1);
        assert_eq!(spy[0].key.lookback_days, 3);
        assert_eq!(spy[0].kind, RequestKind::Direct);
        assert_eq!(spy[0].consumers, BTreeSet::from([1, 2]));
    }

    #[test]
    fn requests_are_grouped_by_instrument() {
        let s = session(vec![
            strategy(1, "MSFT", 300, 2),
            strategy(2, "AAPL", 300, 2),
            strategy(3, "MSFT", 60, 1),
            strategy(4, "AAPL", 900, 2),
        ]);
        let e = expand_session(&s, None);
        let order: Vec<(&str, u32)> = e
            .requests
            .iter()
            .map(|r| (r.instrument().symbol.as_str(), r.key.bar_seconds))
            .collect();
        assert_eq!(
            order,
            vec![("AAPL", 300), ("AAPL", 900), ("MSFT", 300), ("MSFT", 60)]
        );
    }

    #[test]
    fn cross_instrument_indicator_adds_request_and_attachment() {
        let mut s1 = strategy(1, "AAPL", 300, 2);
        s1.indicators = vec![
            IndicatorSpec {
                kind: IndicatorKind::Stochastic(StochasticParams::default()),
                input: None,
            },
            IndicatorSpec {
                kind: IndicatorKind::Sma { period: 5 },
                input: Some(Instrument::stock("SPY")),
            },
        ];
        let e = expand_session(&session(vec![s1]), None);
        assert_eq!(e.requests.len(), 2);
        assert_eq!(e.requests[1].kind, RequestKind::Indicator);
        assert_eq!(e.requests[1].instrument().symbol, "SPY");
        assert_eq!(e.attachments.len(), 2);
        assert_eq!(e.attachments[1].0.instrument.symbol, "SPY");
        assert_eq!(e.attachments[1].0.target_seconds, 300);
    }

    #[test]
    fn backfill_targets_larger_strategies_only() {
        let s = session(vec![strategy(1, "AAPL", 300, 2), strategy(2, "MSFT", 60, 1)]);
        let e = expand_session(&s, Some(60));
        let kinds: Vec<_> = e
            .requests
            .iter()
            .map(|r| (r.instrument().symbol.as_str(), r.kind))
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("AAPL", RequestKind::Direct),
                ("AAPL", RequestKind::Backfill),
                ("MSFT", RequestKind::Direct),
            ]
        );
        let backfill = &e.requests[1];
        assert_eq!(backfill.key.bar_seconds, 60);
        assert_eq!(backfill.key.lookback_days, 1);
        assert_eq!(backfill.targets, BTreeSet::from([300]));
    }

    #[test]
    fn corrections_mark_requests_dirty() {
        let s = session(vec![strategy(1, "AAPL", 7200, 90)]);
        let e = expand_session(&s, None);
        let r = &e.requests[0];
        assert!(r.dirty);
        assert_eq!(r.key.bar_seconds, 3600);
        assert_eq!(r.key.lookback_days, 30);
        assert_eq!(r.targets, BTreeSet::from([7200]));
        assert_eq!(e.corrections.len(), 2);
        assert!(e.corrections[0].starts_with("AAPL 2024-01-15:"));
    }

    #[test]
    fn invalid_strategies_are_rejected() {
        let s = session(vec![strategy(1, "AAPL", 0, 1)]);
        let e = expand_session(&s, None);
        assert!(e.requests.is_empty());
        assert_eq!(e.rejected.len(), 1);
        assert_eq!(e.rejected[0].error, ValidationError::ZeroTarget);
    }
}
