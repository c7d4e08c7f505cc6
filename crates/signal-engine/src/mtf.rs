use technical_analysis::IndicatorSnapshot;
use trading_core::SignalType;

/// Higher-timeframe trend as read by the confluence gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HtfTrend {
    Bullish,
    Bearish,
    Mixed,
}

/// Trend of the higher timeframe from ADX direction, EMA stack and
/// SuperTrend. Two of three must agree; otherwise the reading is Mixed and
/// no signal is blocked.
pub fn higher_timeframe_trend(snap: &IndicatorSnapshot) -> HtfTrend {
    let mut bullish = 0;
    let mut bearish = 0;

    if let (Some(adx), Some(pdi), Some(mdi)) = (snap.adx_14, snap.plus_di, snap.minus_di) {
        if adx > 20.0 {
            if pdi > mdi {
                bullish += 1;
            } else {
                bearish += 1;
            }
        }
    }

    if let (Some(e20), Some(e50)) = (snap.ema_20, snap.ema_50) {
        if e20 > e50 && snap.close > e20 {
            bullish += 1;
        } else if e20 < e50 && snap.close < e20 {
            bearish += 1;
        }
    }

    match snap.supertrend_up {
        Some(true) => bullish += 1,
        Some(false) => bearish += 1,
        None => {}
    }

    if bullish >= 2 && bullish > bearish {
        HtfTrend::Bullish
    } else if bearish >= 2 && bearish > bullish {
        HtfTrend::Bearish
    } else {
        HtfTrend::Mixed
    }
}

impl HtfTrend {
    /// Whether this trend contradicts a proposed signal direction.
    pub fn conflicts_with(&self, signal: SignalType) -> bool {
        matches!(
            (self, signal),
            (HtfTrend::Bearish, SignalType::Buy) | (HtfTrend::Bullish, SignalType::Sell)
        )
    }
}
