use candle_engine::{
    BarSample, BuildOutcome, CandleSeries,
    bucket::SessionAnchor,
    indicators::{Indicator, Stochastic, StochasticParams},
};
use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use proptest::prelude::*;

fn ny_open() -> SessionAnchor {
    SessionAnchor::new(
        NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
        chrono_tz::America::New_York,
    )
}

/// 2024-01-15 09:30 New York.
fn session_open() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 14, 30, 0).unwrap()
}

fn flat(time: DateTime<Utc>, price: f64, volume: f64) -> BarSample {
    BarSample {
        time,
        open: price,
        high: price,
        low: price,
        close: price,
        volume,
        vwap: None,
        trade_count: 1,
    }
}

#[test]
fn one_second_samples_fill_a_five_minute_candle() {
    let mut series = CandleSeries::new("X", 300, ny_open());
    let prices: Vec<f64> = (0..300).map(|i| 100.0 + ((i * 37) % 101) as f64 / 10.0).collect();

    for (i, &p) in prices.iter().enumerate() {
        let outcome = series
            .build_candle(&flat(session_open() + Duration::seconds(i as i64), p, 2.0), 300)
            .unwrap();
        let expected = if i == 0 { BuildOutcome::NewPeriod } else { BuildOutcome::Updated };
        assert_eq!(outcome, expected);
    }

    assert_eq!(series.len(), 1);
    let candle = *series.open_candle().unwrap();
    assert_eq!(candle.period_start, session_open());
    assert_eq!(candle.open, prices[0]);
    assert_eq!(candle.close, prices[299]);
    assert_eq!(candle.high, prices.iter().copied().fold(f64::MIN, f64::max));
    assert_eq!(candle.low, prices.iter().copied().fold(f64::MAX, f64::min));
    assert_eq!(candle.volume, 600.0);
    assert_eq!(candle.trade_count, 300);
    let mean = prices.iter().sum::<f64>() / 300.0;
    assert!((candle.vwap - mean).abs() < 1e-9);

    // The 301st second opens the next candle and seals the first.
    series
        .build_candle(&flat(session_open() + Duration::seconds(300), 1.0, 1.0), 300)
        .unwrap();
    assert_eq!(series.closed(), &[candle]);
}

#[test]
fn ratio_one_copies_samples_exactly() {
    let mut series = CandleSeries::new("X", 60, ny_open());
    let samples: Vec<BarSample> = (0..20)
        .map(|i| BarSample {
            time: session_open() + Duration::minutes(i),
            open: 10.0 + i as f64 * 0.1,
            high: 11.3 + i as f64 * 0.1,
            low: 9.7 + i as f64 * 0.1,
            close: 10.2 + i as f64 * 0.1,
            volume: 1234.5,
            vwap: Some(10.05 + i as f64 * 0.1),
            trade_count: 17,
        })
        .collect();
    for s in &samples {
        assert!(series.build_candle(s, 1).unwrap().is_new_period());
    }
    for (c, s) in series.candles().iter().zip(&samples) {
        assert_eq!(c.period_start, s.time);
        assert_eq!(c.open.to_bits(), s.open.to_bits());
        assert_eq!(c.high.to_bits(), s.high.to_bits());
        assert_eq!(c.low.to_bits(), s.low.to_bits());
        assert_eq!(c.close.to_bits(), s.close.to_bits());
        assert_eq!(c.volume.to_bits(), s.volume.to_bits());
        assert_eq!(Some(c.vwap), s.vwap);
        assert_eq!(c.trade_count, s.trade_count);
    }
}

#[test]
fn hourly_candles_align_to_clock_hour_for_half_hour_open() {
    let mut series = CandleSeries::new("X", 3600, ny_open());
    // 09:30, 09:59, 10:00, 10:59 local.
    for (mins, price) in [(0, 1.0), (29, 2.0), (30, 3.0), (89, 4.0)] {
        series
            .build_candle(&flat(session_open() + Duration::minutes(mins), price, 1.0), 60)
            .unwrap();
    }
    let starts: Vec<_> = series.candles().iter().map(|c| c.period_start).collect();
    assert_eq!(
        starts,
        vec![
            Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 15, 15, 0, 0).unwrap(),
        ]
    );
    assert_eq!(series.candles()[0].close, 2.0);
    assert_eq!(series.candles()[1].close, 4.0);
}

#[test]
fn attached_stochastic_tracks_series() {
    let mut series = CandleSeries::new("X", 60, ny_open());
    series.attach_indicator(Box::new(
        Stochastic::new(StochasticParams::default()).unwrap(),
    ));
    for i in 0..18 {
        let p = 50.0 + (i % 5) as f64;
        series
            .build_candle(&flat(session_open() + Duration::minutes(i), p, 1.0), 1)
            .unwrap();
    }
    let stoch = &series.indicators()[0];
    assert_eq!(stoch.len(), 3);
    assert!(stoch.last().unwrap().signal.is_some());
}

fn sample_stream() -> impl Strategy<Value = Vec<(i64, f64, f64, f64, f64)>> {
    // (seconds step, open, spread up, spread down, close fraction)
    proptest::collection::vec(
        (0i64..90, 10.0f64..200.0, 0.0f64..5.0, 0.0f64..5.0, 0.0f64..1.0),
        1..200,
    )
}

proptest! {
    #[test]
    fn closed_candles_are_well_formed_and_frozen(
        stream in sample_stream(),
        ratio_idx in 0usize..3,
    ) {
        // 300 s series fed by 1 s, 5 s or 60 s bars.
        let (base, ratio) = [(1i64, 300u32), (5, 60), (60, 5)][ratio_idx];
        let mut series = CandleSeries::new("X", 300, ny_open());
        let mut t = session_open();
        let mut frozen = Vec::new();

        for (step, open, up, down, frac) in stream {
            t += Duration::seconds(step * base);
            let (high, low) = (open + up, open - down);
            let sample = BarSample {
                time: t,
                open,
                high,
                low,
                close: low + (high - low) * frac,
                volume: 1.0 + up,
                vwap: None,
                trade_count: 1,
            };
            series.build_candle(&sample, ratio).unwrap();

            for c in series.closed() {
                prop_assert!(c.is_well_formed());
            }
            if let Some(c) = series.open_candle() {
                prop_assert!(c.is_well_formed());
            }
            // Sealed candles never change once sealed.
            prop_assert_eq!(&series.closed()[..frozen.len()], &frozen[..]);
            frozen = series.closed().to_vec();
        }
    }
}
