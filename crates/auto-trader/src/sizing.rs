use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use trading_core::BrokerSymbolInfo;

/// Quote-currency value of one pip for one standard lot. Brokers report
/// this per symbol; 10 units is the FX convention used as fallback.
const DEFAULT_PIP_VALUE_PER_LOT: f64 = 10.0;

/// Risk-based position size: volume = risk_amount / (SL distance in
/// account currency per lot), clamped to the broker's volume bounds and
/// snapped down to its step. Returns None when no valid volume exists.
pub fn position_size(
    balance: f64,
    risk_per_trade_percent: f64,
    entry: f64,
    sl: f64,
    broker: &BrokerSymbolInfo,
) -> Option<f64> {
    let pip_size = broker.point_value * 10.0;
    if pip_size <= 0.0 || balance <= 0.0 {
        return None;
    }
    let sl_distance_pips = (entry - sl).abs() / pip_size;
    if sl_distance_pips <= 0.0 {
        return None;
    }

    let risk_amount = Decimal::from_f64(balance * risk_per_trade_percent / 100.0)?;
    let sl_distance_currency =
        Decimal::from_f64(sl_distance_pips * DEFAULT_PIP_VALUE_PER_LOT)?;
    if sl_distance_currency <= Decimal::ZERO {
        return None;
    }

    let raw = risk_amount / sl_distance_currency;

    let volume_min = Decimal::from_f64(broker.volume_min)?;
    let volume_max = Decimal::from_f64(broker.volume_max)?;
    let step = Decimal::from_f64(broker.volume_step)?;
    if step <= Decimal::ZERO {
        return None;
    }

    let clamped = raw.clamp(volume_min, volume_max);
    let snapped = (clamped / step).floor() * step;

    if snapped <= Decimal::ZERO || snapped < volume_min || snapped > volume_max {
        return None;
    }
    snapped.to_f64()
}
