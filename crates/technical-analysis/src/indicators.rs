use trading_core::Bar;

/// Return val if it is finite, otherwise return default.
#[inline]
pub fn finite_or(val: f64, default: f64) -> f64 {
    if val.is_finite() {
        val
    } else {
        default
    }
}

/// True range series, one value per bar starting at index 1.
fn true_ranges(bars: &[Bar]) -> Vec<f64> {
    let mut out = Vec::with_capacity(bars.len().saturating_sub(1));
    for i in 1..bars.len() {
        let hl = bars[i].high - bars[i].low;
        let hc = (bars[i].high - bars[i - 1].close).abs();
        let lc = (bars[i].low - bars[i - 1].close).abs();
        out.push(hl.max(hc).max(lc));
    }
    out
}

/// Simple Moving Average
pub fn sma(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period {
        return vec![];
    }

    let mut result = Vec::with_capacity(data.len() - period + 1);
    let mut window_sum: f64 = data[..period].iter().sum();
    result.push(finite_or(window_sum / period as f64, 0.0));
    for i in period..data.len() {
        window_sum += data[i] - data[i - period];
        result.push(finite_or(window_sum / period as f64, 0.0));
    }
    result
}

/// Exponential Moving Average. Output length matches input length; the
/// first `period` slots carry the SMA seed so callers can align by index.
pub fn ema(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.is_empty() {
        return vec![];
    }

    if data.len() < period {
        let avg = data.iter().sum::<f64>() / data.len() as f64;
        return vec![finite_or(avg, 0.0)];
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let seed = finite_or(data[..period].iter().sum::<f64>() / period as f64, 0.0);

    let mut result = vec![seed; period];
    for i in period..data.len() {
        let prev = result[i - 1];
        let val = (data[i] - prev) * multiplier + prev;
        result.push(finite_or(val, prev));
    }
    result
}

/// Relative Strength Index (Wilder smoothing)
pub fn rsi(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period + 1 {
        return vec![];
    }

    let mut gains = Vec::with_capacity(data.len() - 1);
    let mut losses = Vec::with_capacity(data.len() - 1);
    for i in 1..data.len() {
        let change = data[i] - data[i - 1];
        gains.push(change.max(0.0));
        losses.push((-change).max(0.0));
    }

    let mut avg_gain = gains[..period].iter().sum::<f64>() / period as f64;
    let mut avg_loss = losses[..period].iter().sum::<f64>() / period as f64;

    let mut out = Vec::with_capacity(gains.len() - period + 1);
    let push_rsi = |avg_gain: f64, avg_loss: f64, out: &mut Vec<f64>| {
        let rs = if avg_loss == 0.0 {
            100.0
        } else {
            avg_gain / avg_loss
        };
        out.push(finite_or(100.0 - 100.0 / (1.0 + rs), 50.0));
    };
    push_rsi(avg_gain, avg_loss, &mut out);

    for i in period..gains.len() {
        avg_gain = (avg_gain * (period - 1) as f64 + gains[i]) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + losses[i]) / period as f64;
        push_rsi(avg_gain, avg_loss, &mut out);
    }

    out
}

/// MACD (Moving Average Convergence Divergence)
pub struct MacdResult {
    pub macd_line: Vec<f64>,
    pub signal_line: Vec<f64>,
    pub histogram: Vec<f64>,
}

pub fn macd(
    data: &[f64],
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
) -> MacdResult {
    if fast_period == 0 || slow_period == 0 || signal_period == 0 || slow_period < fast_period {
        return MacdResult {
            macd_line: vec![],
            signal_line: vec![],
            histogram: vec![],
        };
    }

    let ema_fast = ema(data, fast_period);
    let ema_slow = ema(data, slow_period);
    if ema_fast.len() != data.len() || ema_slow.len() != data.len() {
        return MacdResult {
            macd_line: vec![],
            signal_line: vec![],
            histogram: vec![],
        };
    }

    // Both EMAs are index-aligned to the input, so the difference is too.
    let macd_line: Vec<f64> = data
        .iter()
        .enumerate()
        .skip(slow_period)
        .map(|(i, _)| ema_fast[i] - ema_slow[i])
        .collect();

    let signal_line = ema(&macd_line, signal_period);

    let hist_offset = macd_line.len().saturating_sub(signal_line.len());
    let histogram: Vec<f64> = signal_line
        .iter()
        .enumerate()
        .map(|(i, s)| macd_line[i + hist_offset] - s)
        .collect();

    MacdResult {
        macd_line,
        signal_line,
        histogram,
    }
}

/// Bollinger Bands
pub struct BollingerBands {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

pub fn bollinger_bands(data: &[f64], period: usize, std_dev: f64) -> BollingerBands {
    if period == 0 || data.len() < period {
        return BollingerBands {
            upper: vec![],
            middle: vec![],
            lower: vec![],
        };
    }

    let middle = sma(data, period);
    let mut upper = Vec::with_capacity(middle.len());
    let mut lower = Vec::with_capacity(middle.len());

    for (w, mean) in data.windows(period).zip(middle.iter()) {
        let variance = w.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / period as f64;
        let std = variance.sqrt();
        upper.push(finite_or(mean + std_dev * std, *mean));
        lower.push(finite_or(mean - std_dev * std, *mean));
    }

    BollingerBands {
        upper,
        middle,
        lower,
    }
}

/// Average True Range (Wilder smoothing)
pub fn atr(bars: &[Bar], period: usize) -> Vec<f64> {
    if period == 0 || bars.len() < period + 1 {
        return vec![];
    }

    let trs = true_ranges(bars);
    let mut value = finite_or(trs[..period].iter().sum::<f64>() / period as f64, 0.0);

    let mut out = Vec::with_capacity(trs.len() - period + 1);
    out.push(value);
    for tr in &trs[period..] {
        value = (value * (period - 1) as f64 + tr) / period as f64;
        out.push(finite_or(value, 0.0));
    }
    out
}

/// Stochastic Oscillator
pub struct StochasticResult {
    pub k: Vec<f64>,
    pub d: Vec<f64>,
}

pub fn stochastic(bars: &[Bar], k_period: usize, d_period: usize) -> StochasticResult {
    if k_period == 0 || bars.len() < k_period {
        return StochasticResult { k: vec![], d: vec![] };
    }

    let mut k_values = Vec::with_capacity(bars.len() - k_period + 1);
    for window in bars.windows(k_period) {
        let highest = window
            .iter()
            .map(|b| b.high)
            .fold(f64::NEG_INFINITY, f64::max);
        let lowest = window.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
        let close = window[window.len() - 1].close;

        let k = if highest == lowest {
            50.0
        } else {
            100.0 * (close - lowest) / (highest - lowest)
        };
        k_values.push(finite_or(k, 50.0));
    }

    let d_values = sma(&k_values, d_period);
    StochasticResult {
        k: k_values,
        d: d_values,
    }
}

/// On-Balance Volume
pub fn obv(bars: &[Bar]) -> Vec<f64> {
    if bars.is_empty() {
        return vec![];
    }

    let mut out = Vec::with_capacity(bars.len());
    out.push(bars[0].volume);
    for i in 1..bars.len() {
        let prev = out[i - 1];
        let next = if bars[i].close > bars[i - 1].close {
            prev + bars[i].volume
        } else if bars[i].close < bars[i - 1].close {
            prev - bars[i].volume
        } else {
            prev
        };
        out.push(next);
    }
    out
}

/// Average Directional Index. plus_di/minus_di carry the directional lines;
/// adx is the Wilder-smoothed trend strength (0-100).
pub struct AdxResult {
    pub adx: Vec<f64>,
    pub plus_di: Vec<f64>,
    pub minus_di: Vec<f64>,
}

pub fn adx(bars: &[Bar], period: usize) -> AdxResult {
    let empty = AdxResult {
        adx: vec![],
        plus_di: vec![],
        minus_di: vec![],
    };
    if period == 0 || bars.len() < period * 2 + 1 {
        return empty;
    }

    let mut plus_dm = Vec::with_capacity(bars.len() - 1);
    let mut minus_dm = Vec::with_capacity(bars.len() - 1);
    for i in 1..bars.len() {
        let up = bars[i].high - bars[i - 1].high;
        let down = bars[i - 1].low - bars[i].low;
        plus_dm.push(if up > down && up > 0.0 { up } else { 0.0 });
        minus_dm.push(if down > up && down > 0.0 { down } else { 0.0 });
    }
    let trs = true_ranges(bars);

    let mut sm_plus = plus_dm[..period].iter().sum::<f64>();
    let mut sm_minus = minus_dm[..period].iter().sum::<f64>();
    let mut sm_tr = trs[..period].iter().sum::<f64>();

    let mut plus_di = Vec::new();
    let mut minus_di = Vec::new();
    let mut dx_values = Vec::new();

    for i in period..plus_dm.len() {
        sm_plus = sm_plus - sm_plus / period as f64 + plus_dm[i];
        sm_minus = sm_minus - sm_minus / period as f64 + minus_dm[i];
        sm_tr = sm_tr - sm_tr / period as f64 + trs[i];

        let (pdi, mdi) = if sm_tr > 0.0 {
            (100.0 * sm_plus / sm_tr, 100.0 * sm_minus / sm_tr)
        } else {
            (0.0, 0.0)
        };
        plus_di.push(pdi);
        minus_di.push(mdi);

        let di_sum = pdi + mdi;
        dx_values.push(if di_sum > 0.0 {
            100.0 * (pdi - mdi).abs() / di_sum
        } else {
            0.0
        });
    }

    if dx_values.len() < period {
        return AdxResult {
            adx: vec![],
            plus_di,
            minus_di,
        };
    }

    let mut adx_val = finite_or(dx_values[..period].iter().sum::<f64>() / period as f64, 0.0);
    let mut adx_values = vec![adx_val];
    for dx in &dx_values[period..] {
        adx_val = (adx_val * (period - 1) as f64 + dx) / period as f64;
        adx_values.push(finite_or(adx_val, 0.0));
    }

    AdxResult {
        adx: adx_values,
        plus_di,
        minus_di,
    }
}

/// Volume-Weighted Average Price (cumulative over the supplied bars)
pub fn vwap(bars: &[Bar]) -> Vec<f64> {
    let mut out = Vec::with_capacity(bars.len());
    let mut cum_tpv = 0.0;
    let mut cum_vol = 0.0;

    for bar in bars {
        let typical = (bar.high + bar.low + bar.close) / 3.0;
        cum_tpv += typical * bar.volume;
        cum_vol += bar.volume;
        let v = if cum_vol > 0.0 { cum_tpv / cum_vol } else { typical };
        out.push(finite_or(v, typical));
    }
    out
}

/// Ichimoku components, aligned to the current bar: span values are the
/// ones that were plotted 26 bars ahead, i.e. the cloud under today's price.
pub struct IchimokuResult {
    pub tenkan_sen: Vec<f64>,
    pub kijun_sen: Vec<f64>,
    pub senkou_span_a: Vec<f64>,
    pub senkou_span_b: Vec<f64>,
    pub chikou_span: Vec<f64>,
}

fn midpoint(bars: &[Bar], end: usize, period: usize) -> f64 {
    let start = end.saturating_sub(period - 1);
    let slice = &bars[start..=end];
    let high = slice
        .iter()
        .map(|b| b.high)
        .fold(f64::NEG_INFINITY, f64::max);
    let low = slice.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
    (high + low) / 2.0
}

pub fn ichimoku(bars: &[Bar]) -> IchimokuResult {
    let empty = IchimokuResult {
        tenkan_sen: vec![],
        kijun_sen: vec![],
        senkou_span_a: vec![],
        senkou_span_b: vec![],
        chikou_span: vec![],
    };
    if bars.len() < 52 {
        return empty;
    }

    let n = bars.len();
    let mut tenkan = Vec::with_capacity(n);
    let mut kijun = Vec::with_capacity(n);
    for i in 0..n {
        tenkan.push(if i >= 8 { midpoint(bars, i, 9) } else { bars[i].close });
        kijun.push(if i >= 25 { midpoint(bars, i, 26) } else { bars[i].close });
    }

    let mut span_a = Vec::new();
    let mut span_b = Vec::new();
    for i in 25..n {
        let src = i - 25;
        span_a.push((tenkan[src] + kijun[src]) / 2.0);
        span_b.push(if src >= 51 {
            midpoint(bars, src, 52)
        } else {
            bars[src].close
        });
    }

    let chikou: Vec<f64> = bars[26..].iter().map(|b| b.close).collect();

    IchimokuResult {
        tenkan_sen: tenkan,
        kijun_sen: kijun,
        senkou_span_a: span_a,
        senkou_span_b: span_b,
        chikou_span: chikou,
    }
}

/// SuperTrend: ATR band that flips between support and resistance as price
/// crosses it. `trend_up[i]` reports the direction at bar i.
pub struct SuperTrendResult {
    pub line: Vec<f64>,
    pub trend_up: Vec<bool>,
}

pub fn supertrend(bars: &[Bar], period: usize, multiplier: f64) -> SuperTrendResult {
    if period == 0 || bars.len() < period + 2 {
        return SuperTrendResult {
            line: vec![],
            trend_up: vec![],
        };
    }

    let atr_values = atr(bars, period);
    // ATR[0] corresponds to bars[period]
    let offset = period;

    let mut line = Vec::with_capacity(atr_values.len());
    let mut trend_up = Vec::with_capacity(atr_values.len());

    let mut upper_band = 0.0;
    let mut lower_band = 0.0;
    let mut up = true;

    for (j, atr_val) in atr_values.iter().enumerate() {
        let i = offset + j;
        let mid = (bars[i].high + bars[i].low) / 2.0;
        let basic_upper = mid + multiplier * atr_val;
        let basic_lower = mid - multiplier * atr_val;
        let close = bars[i].close;
        let prev_close = bars[i - 1].close;

        if j == 0 {
            upper_band = basic_upper;
            lower_band = basic_lower;
            up = close > mid;
        } else {
            // Bands only tighten; they reset when price closes through them
            upper_band = if basic_upper < upper_band || prev_close > upper_band {
                basic_upper
            } else {
                upper_band
            };
            lower_band = if basic_lower > lower_band || prev_close < lower_band {
                basic_lower
            } else {
                lower_band
            };

            up = if up { close >= lower_band } else { close > upper_band };
        }

        line.push(if up { lower_band } else { upper_band });
        trend_up.push(up);
    }

    SuperTrendResult { line, trend_up }
}

/// Support and resistance from swing points with 2-bar confirmation.
pub struct SupportResistance {
    pub support: Option<f64>,
    pub resistance: Option<f64>,
}

pub fn support_resistance(bars: &[Bar], lookback: usize) -> SupportResistance {
    if bars.len() < lookback + 2 || lookback < 5 {
        return SupportResistance {
            support: None,
            resistance: None,
        };
    }

    let recent = &bars[bars.len() - lookback..];
    let mut swing_highs: Vec<f64> = Vec::new();
    let mut swing_lows: Vec<f64> = Vec::new();

    for i in 2..recent.len() - 2 {
        let h = recent[i].high;
        if h > recent[i - 1].high
            && h > recent[i - 2].high
            && h > recent[i + 1].high
            && h > recent[i + 2].high
        {
            swing_highs.push(h);
        }
        let l = recent[i].low;
        if l < recent[i - 1].low
            && l < recent[i - 2].low
            && l < recent[i + 1].low
            && l < recent[i + 2].low
        {
            swing_lows.push(l);
        }
    }

    let current = bars[bars.len() - 1].close;
    SupportResistance {
        // nearest swing low below / swing high above
        support: swing_lows
            .iter()
            .filter(|&&l| l < current)
            .copied()
            .reduce(f64::max),
        resistance: swing_highs
            .iter()
            .filter(|&&h| h > current)
            .copied()
            .reduce(f64::min),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Uptrend,
    Downtrend,
    Sideways,
}

/// Classify the trend over `period` bars from EMA slope and price position.
pub fn detect_trend(bars: &[Bar], period: usize) -> Trend {
    if bars.len() < period + 1 {
        return Trend::Sideways;
    }

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let ema_values = ema(&closes, period);
    if ema_values.len() < 2 {
        return Trend::Sideways;
    }

    let last = ema_values[ema_values.len() - 1];
    let prev = ema_values[ema_values.len() - 2];
    let price = closes[closes.len() - 1];
    let slope_pct = if prev != 0.0 { (last - prev) / prev * 100.0 } else { 0.0 };

    if slope_pct > 0.02 && price > last {
        Trend::Uptrend
    } else if slope_pct < -0.02 && price < last {
        Trend::Downtrend
    } else {
        Trend::Sideways
    }
}
