use serde::{Deserialize, Serialize};
use trading_core::Bar;

use crate::indicators::*;
use crate::patterns::{detect_patterns, PatternMatch};

/// Latest value of every indicator, computed from one bar series in a
/// single pass. Evaluations read this struct instead of the raw series, so
/// every vote inside one evaluation reflects the same closing bar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub close: f64,
    pub rsi_14: Option<f64>,
    pub macd_histogram: Option<f64>,
    pub macd_histogram_prev: Option<f64>,
    pub bb_upper: Option<f64>,
    pub bb_lower: Option<f64>,
    pub bb_middle: Option<f64>,
    pub atr_14: Option<f64>,
    pub ema_20: Option<f64>,
    pub ema_50: Option<f64>,
    pub ema_200: Option<f64>,
    pub adx_14: Option<f64>,
    pub plus_di: Option<f64>,
    pub minus_di: Option<f64>,
    pub stoch_k: Option<f64>,
    pub stoch_d: Option<f64>,
    pub obv_slope: Option<f64>,
    pub vwap: Option<f64>,
    pub ichimoku_tenkan: Option<f64>,
    pub ichimoku_kijun: Option<f64>,
    pub ichimoku_span_a: Option<f64>,
    pub ichimoku_span_b: Option<f64>,
    pub supertrend_line: Option<f64>,
    pub supertrend_up: Option<bool>,
}

fn last(v: &[f64]) -> Option<f64> {
    v.last().copied()
}

fn prev(v: &[f64]) -> Option<f64> {
    if v.len() >= 2 {
        Some(v[v.len() - 2])
    } else {
        None
    }
}

impl IndicatorSnapshot {
    /// Compute the full snapshot. The heavier bar-based indicators run on a
    /// separate rayon branch from the close-based ones.
    pub fn compute(bars: &[Bar]) -> IndicatorSnapshot {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let close = closes.last().copied().unwrap_or(0.0);

        let (close_based, bar_based) = rayon::join(
            || {
                let rsi_values = rsi(&closes, 14);
                let macd_result = macd(&closes, 12, 26, 9);
                let bb = bollinger_bands(&closes, 20, 2.0);
                let ema_20 = ema(&closes, 20);
                let ema_50 = ema(&closes, 50);
                let ema_200 = ema(&closes, 200);
                (rsi_values, macd_result, bb, ema_20, ema_50, ema_200)
            },
            || {
                let atr_values = atr(bars, 14);
                let adx_result = adx(bars, 14);
                let stoch = stochastic(bars, 14, 3);
                let obv_values = obv(bars);
                let vwap_values = vwap(bars);
                let ichi = ichimoku(bars);
                let st = supertrend(bars, 10, 3.0);
                (atr_values, adx_result, stoch, obv_values, vwap_values, ichi, st)
            },
        );

        let (rsi_values, macd_result, bb, ema_20, ema_50, ema_200) = close_based;
        let (atr_values, adx_result, stoch, obv_values, vwap_values, ichi, st) = bar_based;

        // OBV direction over the last 5 bars
        let obv_slope = if obv_values.len() >= 5 {
            Some(obv_values[obv_values.len() - 1] - obv_values[obv_values.len() - 5])
        } else {
            None
        };

        IndicatorSnapshot {
            close,
            rsi_14: last(&rsi_values),
            macd_histogram: last(&macd_result.histogram),
            macd_histogram_prev: prev(&macd_result.histogram),
            bb_upper: last(&bb.upper),
            bb_lower: last(&bb.lower),
            bb_middle: last(&bb.middle),
            atr_14: last(&atr_values),
            ema_20: last(&ema_20),
            ema_50: last(&ema_50),
            ema_200: if bars.len() >= 200 { last(&ema_200) } else { None },
            adx_14: last(&adx_result.adx),
            plus_di: last(&adx_result.plus_di),
            minus_di: last(&adx_result.minus_di),
            stoch_k: last(&stoch.k),
            stoch_d: last(&stoch.d),
            obv_slope,
            vwap: last(&vwap_values),
            ichimoku_tenkan: last(&ichi.tenkan_sen),
            ichimoku_kijun: last(&ichi.kijun_sen),
            ichimoku_span_a: last(&ichi.senkou_span_a),
            ichimoku_span_b: last(&ichi.senkou_span_b),
            supertrend_line: last(&st.line),
            supertrend_up: st.trend_up.last().copied(),
        }
    }

    /// Patterns on the same bar series (separate because callers sometimes
    /// need only the numeric snapshot).
    pub fn patterns(bars: &[Bar]) -> Vec<PatternMatch> {
        detect_patterns(bars)
    }
}
