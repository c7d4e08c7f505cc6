use crate::indicators::*;
use chrono::Utc;
use trading_core::Bar;

// Helper to create sample price data
fn sample_prices() -> Vec<f64> {
    vec![
        1.0834, 1.0829, 1.0835, 1.0821, 1.0843, 1.0853, 1.0860, 1.0872, 1.0884, 1.0898,
        1.0889, 1.0893, 1.0881, 1.0908, 1.0908, 1.0900, 1.0903, 1.0921, 1.0912, 1.0894,
    ]
}

// Helper to create a rising bar series
fn rising_bars(n: usize) -> Vec<Bar> {
    (0..n)
        .map(|i| {
            let base = 100.0 + i as f64;
            Bar {
                timestamp: Utc::now() - chrono::Duration::hours((n - i) as i64),
                open: base,
                high: base + 2.0,
                low: base - 1.0,
                close: base + 1.0,
                volume: 1_000_000.0,
            }
        })
        .collect()
}

#[test]
fn sma_basic() {
    let data = vec![1.0, 2.0, 3.0, 4.0, 5.0];
    let result = sma(&data, 3);

    assert_eq!(result.len(), 3);
    assert!((result[0] - 2.0).abs() < 1e-9);
    assert!((result[1] - 3.0).abs() < 1e-9);
    assert!((result[2] - 4.0).abs() < 1e-9);
}

#[test]
fn sma_insufficient_data() {
    assert!(sma(&[1.0, 2.0], 5).is_empty());
    assert!(sma(&[1.0, 2.0], 0).is_empty());
}

#[test]
fn ema_seeded_with_sma() {
    let data = vec![22.0, 24.0, 23.0, 25.0, 26.0];
    let result = ema(&data, 3);

    assert_eq!(result.len(), data.len());
    let seed = (22.0 + 24.0 + 23.0) / 3.0;
    assert!((result[0] - seed).abs() < 1e-9);
}

#[test]
fn ema_follows_uptrend() {
    let data: Vec<f64> = (1..=10).map(|i| i as f64).collect();
    let result = ema(&data, 3);
    for i in 3..result.len() {
        assert!(result[i] > result[i - 1]);
    }
}

#[test]
fn rsi_bounded() {
    let result = rsi(&sample_prices(), 14);
    assert!(!result.is_empty());
    for &v in &result {
        assert!((0.0..=100.0).contains(&v), "RSI out of range: {}", v);
    }
}

#[test]
fn rsi_extreme_on_monotonic_gains() {
    let data: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
    let result = rsi(&data, 14);
    assert!(*result.last().unwrap() > 99.0);
}

#[test]
fn macd_lines_align() {
    let closes: Vec<f64> = (0..120).map(|i| 100.0 + (i as f64 * 0.3).sin()).collect();
    let result = macd(&closes, 12, 26, 9);
    assert!(!result.macd_line.is_empty());
    assert!(!result.signal_line.is_empty());
    assert_eq!(result.histogram.len(), result.signal_line.len());
}

#[test]
fn bollinger_envelope_contains_sma() {
    let result = bollinger_bands(&sample_prices(), 5, 2.0);
    assert_eq!(result.upper.len(), result.middle.len());
    assert_eq!(result.lower.len(), result.middle.len());
    for i in 0..result.middle.len() {
        assert!(result.upper[i] >= result.middle[i]);
        assert!(result.lower[i] <= result.middle[i]);
    }
}

#[test]
fn atr_positive_on_moving_market() {
    let bars = rising_bars(30);
    let result = atr(&bars, 14);
    assert!(!result.is_empty());
    for &v in &result {
        assert!(v > 0.0);
    }
}

#[test]
fn stochastic_high_in_uptrend() {
    let bars = rising_bars(30);
    let result = stochastic(&bars, 14, 3);
    assert!(!result.k.is_empty());
    // Closing near the top of the range keeps %K elevated
    assert!(*result.k.last().unwrap() > 50.0);
}

#[test]
fn obv_accumulates_in_uptrend() {
    let bars = rising_bars(10);
    let result = obv(&bars);
    assert_eq!(result.len(), 10);
    assert!(result.last().unwrap() > result.first().unwrap());
}

#[test]
fn adx_reports_strong_trend() {
    let bars = rising_bars(60);
    let result = adx(&bars, 14);
    assert!(!result.adx.is_empty());
    let last_adx = *result.adx.last().unwrap();
    assert!(last_adx > 20.0, "steady uptrend should trend: {}", last_adx);
    assert!(result.plus_di.last().unwrap() > result.minus_di.last().unwrap());
}

#[test]
fn vwap_tracks_typical_price() {
    let bars = rising_bars(20);
    let result = vwap(&bars);
    assert_eq!(result.len(), 20);
    // Equal volumes: VWAP is the running mean of typical prices, so it lags
    // the latest typical price in an uptrend
    let last_typical = (bars[19].high + bars[19].low + bars[19].close) / 3.0;
    assert!(*result.last().unwrap() < last_typical);
}

#[test]
fn ichimoku_requires_52_bars() {
    let short = rising_bars(40);
    assert!(ichimoku(&short).tenkan_sen.is_empty());

    let bars = rising_bars(80);
    let result = ichimoku(&bars);
    assert_eq!(result.tenkan_sen.len(), 80);
    assert_eq!(result.kijun_sen.len(), 80);
    assert!(!result.senkou_span_a.is_empty());
}

#[test]
fn supertrend_up_in_uptrend() {
    let bars = rising_bars(40);
    let result = supertrend(&bars, 10, 3.0);
    assert!(!result.line.is_empty());
    assert!(*result.trend_up.last().unwrap());
    // In an uptrend the line sits below price
    let last_close = bars.last().unwrap().close;
    assert!(*result.line.last().unwrap() < last_close);
}

#[test]
fn trend_detection() {
    assert_eq!(detect_trend(&rising_bars(40), 20), Trend::Uptrend);

    let mut falling = rising_bars(40);
    falling.reverse();
    for (i, b) in falling.iter_mut().enumerate() {
        b.timestamp = Utc::now() - chrono::Duration::hours((40 - i) as i64);
    }
    assert_eq!(detect_trend(&falling, 20), Trend::Downtrend);
}

#[test]
fn support_resistance_from_swings() {
    // Build a W-shaped series so swing points exist
    let mut bars = Vec::new();
    let shape = [
        105.0, 103.0, 101.0, 99.0, 101.0, 103.0, 105.0, 107.0, 105.0, 103.0, 101.0, 100.0,
        102.0, 104.0, 103.5, 103.0, 103.2, 103.4, 103.1, 103.3,
    ];
    for (i, &c) in shape.iter().enumerate() {
        bars.push(Bar {
            timestamp: Utc::now() - chrono::Duration::hours((shape.len() - i) as i64),
            open: c - 0.2,
            high: c + 0.5,
            low: c - 0.5,
            close: c,
            volume: 1000.0,
        });
    }
    let sr = support_resistance(&bars, 18);
    assert!(sr.support.is_some());
    assert!(sr.resistance.is_some());
    let last = bars.last().unwrap().close;
    assert!(sr.support.unwrap() < last);
    assert!(sr.resistance.unwrap() > last);
}
