use trading_core::Bar;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandlePattern {
    Doji,
    Hammer,
    ShootingStar,
    BullishEngulfing,
    BearishEngulfing,
    MorningStar,
    EveningStar,
}

impl CandlePattern {
    pub fn name(&self) -> &'static str {
        match self {
            CandlePattern::Doji => "Doji",
            CandlePattern::Hammer => "Hammer",
            CandlePattern::ShootingStar => "Shooting Star",
            CandlePattern::BullishEngulfing => "Bullish Engulfing",
            CandlePattern::BearishEngulfing => "Bearish Engulfing",
            CandlePattern::MorningStar => "Morning Star",
            CandlePattern::EveningStar => "Evening Star",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PatternMatch {
    pub pattern: CandlePattern,
    pub strength: f64, // 0.0 to 1.0
    pub bullish: bool,
    /// Above-average volume on the confirming bar.
    pub volume_confirmed: bool,
    /// The prior short-term trend supports the reversal reading.
    pub trend_confirmed: bool,
}

fn body(bar: &Bar) -> f64 {
    (bar.close - bar.open).abs()
}

fn range(bar: &Bar) -> f64 {
    bar.high - bar.low
}

fn lower_shadow(bar: &Bar) -> f64 {
    bar.open.min(bar.close) - bar.low
}

fn upper_shadow(bar: &Bar) -> f64 {
    bar.high - bar.open.max(bar.close)
}

fn is_bullish(bar: &Bar) -> bool {
    bar.close > bar.open
}

/// Short-term direction of the bars before the pattern; reversal patterns
/// only count when they appear against it.
fn prior_downtrend(bars: &[Bar], before: usize) -> bool {
    if before < 4 {
        return false;
    }
    bars[before - 1].close < bars[before - 4].close
}

fn prior_uptrend(bars: &[Bar], before: usize) -> bool {
    if before < 4 {
        return false;
    }
    bars[before - 1].close > bars[before - 4].close
}

fn volume_above_average(bars: &[Bar], idx: usize) -> bool {
    if idx < 10 {
        return false;
    }
    let avg: f64 = bars[idx - 10..idx].iter().map(|b| b.volume).sum::<f64>() / 10.0;
    avg > 0.0 && bars[idx].volume > avg
}

fn check_doji(bar: &Bar) -> Option<(CandlePattern, f64, bool)> {
    let r = range(bar);
    if r > 0.0 && body(bar) / r < 0.1 {
        // direction-neutral; bullishness is decided by context
        return Some((CandlePattern::Doji, 0.3, is_bullish(bar)));
    }
    None
}

fn check_hammer(bar: &Bar) -> Option<(CandlePattern, f64, bool)> {
    let r = range(bar);
    let b = body(bar);
    if r == 0.0 || b == 0.0 {
        return None;
    }
    if b / r < 0.3 && lower_shadow(bar) > 2.0 * b && upper_shadow(bar) < b * 0.5 {
        let strength = (lower_shadow(bar) / b).min(5.0) / 5.0;
        return Some((CandlePattern::Hammer, strength, true));
    }
    None
}

fn check_shooting_star(bar: &Bar) -> Option<(CandlePattern, f64, bool)> {
    let r = range(bar);
    let b = body(bar);
    if r == 0.0 || b == 0.0 {
        return None;
    }
    if b / r < 0.3 && upper_shadow(bar) > 2.0 * b && lower_shadow(bar) < b * 0.5 {
        let strength = (upper_shadow(bar) / b).min(5.0) / 5.0;
        return Some((CandlePattern::ShootingStar, strength, false));
    }
    None
}

fn check_engulfing(prev: &Bar, curr: &Bar) -> Option<(CandlePattern, f64, bool)> {
    let prev_body = body(prev);
    if prev_body == 0.0 {
        return None;
    }

    if !is_bullish(prev) && is_bullish(curr) && curr.open <= prev.close && curr.close >= prev.open {
        let ratio = body(curr) / prev_body;
        return Some((CandlePattern::BullishEngulfing, ratio.min(2.0) / 2.0, true));
    }
    if is_bullish(prev) && !is_bullish(curr) && curr.open >= prev.close && curr.close <= prev.open {
        let ratio = body(curr) / prev_body;
        return Some((CandlePattern::BearishEngulfing, ratio.min(2.0) / 2.0, false));
    }
    None
}

fn check_star(a: &Bar, b: &Bar, c: &Bar) -> Option<(CandlePattern, f64, bool)> {
    let a_body = body(a);
    let b_body = body(b);
    let c_body = body(c);
    if a_body == 0.0 || c_body == 0.0 {
        return None;
    }

    let small_middle = b_body < a_body * 0.3;

    // Morning star: long bearish, small middle gapping down, long bullish
    // closing into the first body
    if !is_bullish(a)
        && small_middle
        && is_bullish(c)
        && b.open.max(b.close) < a.close
        && c.close > (a.open + a.close) / 2.0
    {
        let strength = (c_body / a_body).min(1.5) / 1.5;
        return Some((CandlePattern::MorningStar, strength, true));
    }

    // Evening star: mirrored
    if is_bullish(a)
        && small_middle
        && !is_bullish(c)
        && b.open.min(b.close) > a.close
        && c.close < (a.open + a.close) / 2.0
    {
        let strength = (c_body / a_body).min(1.5) / 1.5;
        return Some((CandlePattern::EveningStar, strength, false));
    }
    None
}

/// Detect candlestick patterns on the last bars of the series, newest bar
/// last. Confirmation flags are computed against the preceding bars.
pub fn detect_patterns(bars: &[Bar]) -> Vec<PatternMatch> {
    let n = bars.len();
    if n < 2 {
        return vec![];
    }

    let mut found: Vec<(CandlePattern, f64, bool)> = Vec::new();
    let last = &bars[n - 1];

    if let Some(m) = check_doji(last) {
        found.push(m);
    }
    if let Some(m) = check_hammer(last) {
        found.push(m);
    }
    if let Some(m) = check_shooting_star(last) {
        found.push(m);
    }
    if let Some(m) = check_engulfing(&bars[n - 2], last) {
        found.push(m);
    }
    if n >= 3 {
        if let Some(m) = check_star(&bars[n - 3], &bars[n - 2], last) {
            found.push(m);
        }
    }

    let volume_confirmed = volume_above_average(bars, n - 1);

    found
        .into_iter()
        .map(|(pattern, strength, bullish)| {
            let trend_confirmed = if bullish {
                prior_downtrend(bars, n - 1)
            } else {
                prior_uptrend(bars, n - 1)
            };
            PatternMatch {
                pattern,
                strength,
                bullish,
                volume_confirmed,
                trend_confirmed,
            }
        })
        .collect()
}
