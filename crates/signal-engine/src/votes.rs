use technical_analysis::{IndicatorSnapshot, PatternMatch};
use trading_core::SignalType;

use crate::weights::WeightTable;

/// One indicator's contribution to the ensemble.
#[derive(Debug, Clone)]
pub struct IndicatorVote {
    pub name: &'static str,
    pub vote: SignalType,
    /// Normalized strength in [0, 1].
    pub strength: f64,
    pub weight: f64,
}

fn vote(name: &'static str, vote: SignalType, strength: f64, weight: f64) -> IndicatorVote {
    IndicatorVote {
        name,
        vote,
        strength: strength.clamp(0.0, 1.0),
        weight,
    }
}

fn hold(name: &'static str) -> IndicatorVote {
    // A missing or failed indicator contributes a zero-weight HOLD instead
    // of aborting the evaluation.
    vote(name, SignalType::Hold, 0.0, 0.0)
}

/// Turn a cohort snapshot plus detected patterns into per-indicator votes.
pub fn collect_votes(
    snap: &IndicatorSnapshot,
    patterns: &[PatternMatch],
    weights: &WeightTable,
) -> Vec<IndicatorVote> {
    let mut votes = Vec::with_capacity(12);
    let close = snap.close;

    // RSI: deeper oversold reads stronger
    votes.push(match snap.rsi_14 {
        Some(rsi) if rsi < 30.0 => vote("rsi", SignalType::Buy, (30.0 - rsi) / 30.0 + 0.5, weights.rsi),
        Some(rsi) if rsi > 70.0 => vote("rsi", SignalType::Sell, (rsi - 70.0) / 30.0 + 0.5, weights.rsi),
        Some(_) => vote("rsi", SignalType::Hold, 0.0, weights.rsi),
        None => hold("rsi"),
    });

    // MACD: zero-line cross of the histogram is the strong event
    votes.push(match (snap.macd_histogram, snap.macd_histogram_prev) {
        (Some(h), Some(p)) if h > 0.0 && p <= 0.0 => vote("macd", SignalType::Buy, 0.9, weights.macd),
        (Some(h), Some(p)) if h < 0.0 && p >= 0.0 => vote("macd", SignalType::Sell, 0.9, weights.macd),
        (Some(h), _) if h > 0.0 => vote("macd", SignalType::Buy, 0.3, weights.macd),
        (Some(h), _) if h < 0.0 => vote("macd", SignalType::Sell, 0.3, weights.macd),
        _ => hold("macd"),
    });

    // Bollinger: price outside the envelope
    votes.push(match (snap.bb_lower, snap.bb_upper) {
        (Some(lower), _) if close < lower => vote("bollinger", SignalType::Buy, 0.7, weights.bollinger),
        (_, Some(upper)) if close > upper => vote("bollinger", SignalType::Sell, 0.7, weights.bollinger),
        (Some(_), Some(_)) => vote("bollinger", SignalType::Hold, 0.0, weights.bollinger),
        _ => hold("bollinger"),
    });

    // EMA stack: 20 over 50 with price above reads bullish; the 200 as a
    // long-term filter strengthens agreement when available
    votes.push(match (snap.ema_20, snap.ema_50) {
        (Some(e20), Some(e50)) if close > e20 && e20 > e50 => {
            let boosted = matches!(snap.ema_200, Some(e200) if close > e200);
            vote("ema", SignalType::Buy, if boosted { 0.9 } else { 0.6 }, weights.ema)
        }
        (Some(e20), Some(e50)) if close < e20 && e20 < e50 => {
            let boosted = matches!(snap.ema_200, Some(e200) if close < e200);
            vote("ema", SignalType::Sell, if boosted { 0.9 } else { 0.6 }, weights.ema)
        }
        (Some(_), Some(_)) => vote("ema", SignalType::Hold, 0.0, weights.ema),
        _ => hold("ema"),
    });

    // ADX: directional only when the trend is strong enough
    votes.push(match (snap.adx_14, snap.plus_di, snap.minus_di) {
        (Some(adx), Some(pdi), Some(mdi)) if adx > 25.0 => {
            let strength = (adx / 50.0).min(1.0);
            if pdi > mdi {
                vote("adx", SignalType::Buy, strength, weights.adx)
            } else {
                vote("adx", SignalType::Sell, strength, weights.adx)
            }
        }
        (Some(_), _, _) => vote("adx", SignalType::Hold, 0.0, weights.adx),
        _ => hold("adx"),
    });

    // Stochastic
    votes.push(match snap.stoch_k {
        Some(k) if k < 20.0 => vote("stochastic", SignalType::Buy, (20.0 - k) / 20.0 + 0.4, weights.stochastic),
        Some(k) if k > 80.0 => vote("stochastic", SignalType::Sell, (k - 80.0) / 20.0 + 0.4, weights.stochastic),
        Some(_) => vote("stochastic", SignalType::Hold, 0.0, weights.stochastic),
        None => hold("stochastic"),
    });

    // OBV slope as volume confirmation
    votes.push(match snap.obv_slope {
        Some(s) if s > 0.0 => vote("obv", SignalType::Buy, 0.4, weights.obv),
        Some(s) if s < 0.0 => vote("obv", SignalType::Sell, 0.4, weights.obv),
        _ => hold("obv"),
    });

    // VWAP side
    votes.push(match snap.vwap {
        Some(v) if close > v => vote("vwap", SignalType::Buy, 0.3, weights.vwap),
        Some(v) if close < v => vote("vwap", SignalType::Sell, 0.3, weights.vwap),
        _ => hold("vwap"),
    });

    // Ichimoku: position relative to the cloud plus TK cross
    votes.push(
        match (snap.ichimoku_span_a, snap.ichimoku_span_b, snap.ichimoku_tenkan, snap.ichimoku_kijun) {
            (Some(a), Some(b), Some(tenkan), Some(kijun)) => {
                let cloud_top = a.max(b);
                let cloud_bottom = a.min(b);
                if close > cloud_top && tenkan > kijun {
                    vote("ichimoku", SignalType::Buy, 0.7, weights.ichimoku)
                } else if close < cloud_bottom && tenkan < kijun {
                    vote("ichimoku", SignalType::Sell, 0.7, weights.ichimoku)
                } else {
                    vote("ichimoku", SignalType::Hold, 0.0, weights.ichimoku)
                }
            }
            _ => hold("ichimoku"),
        },
    );

    // SuperTrend direction
    votes.push(match snap.supertrend_up {
        Some(true) => vote("supertrend", SignalType::Buy, 0.6, weights.supertrend),
        Some(false) => vote("supertrend", SignalType::Sell, 0.6, weights.supertrend),
        None => hold("supertrend"),
    });

    // Candlestick patterns, counted once with the strongest confirmed match
    let best_pattern = patterns
        .iter()
        .filter(|p| p.trend_confirmed)
        .max_by(|a, b| a.strength.total_cmp(&b.strength));
    votes.push(match best_pattern {
        Some(p) => {
            let strength = if p.volume_confirmed { p.strength + 0.2 } else { p.strength };
            let direction = if p.bullish { SignalType::Buy } else { SignalType::Sell };
            vote("pattern", direction, strength, weights.pattern)
        }
        None => vote("pattern", SignalType::Hold, 0.0, weights.pattern),
    });

    votes
}
