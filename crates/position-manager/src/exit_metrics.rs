use chrono::{DateTime, Utc};
use storage::TradeCloseUpdate;
use trading_core::{BrokerSymbolInfo, CloseReason, Session, Tick, Trade};

/// Adopt the server's close reason when the EA reported a generic MANUAL
/// close but a protective worker had issued the close command.
pub fn resolve_close_reason(reported: CloseReason, worker_reason: Option<&str>) -> CloseReason {
    if reported != CloseReason::Manual {
        return reported;
    }
    match worker_reason.map(CloseReason::parse) {
        Some(r @ (CloseReason::TimeExit | CloseReason::StrategyInvalid | CloseReason::EmergencyClose)) => r,
        _ => reported,
    }
}

/// Build the close-out annotations for a trade the EA reported closed.
#[allow(clippy::too_many_arguments)]
pub fn close_update_for(
    trade: &Trade,
    broker: &BrokerSymbolInfo,
    close_price: Option<f64>,
    close_time: DateTime<Utc>,
    close_reason: CloseReason,
    profit: Option<f64>,
    commission: Option<f64>,
    swap: Option<f64>,
    latest_tick: Option<&Tick>,
) -> TradeCloseUpdate {
    let sign = trade.direction.sign();

    let pips_captured = close_price.map(|close| {
        // One pip is ten points on fractional-pip symbols.
        let pip_size = broker.point_value * 10.0;
        if pip_size > 0.0 {
            (close - trade.open_price) * sign / pip_size
        } else {
            0.0
        }
    });

    let risk_reward_realized = match (close_price, trade.initial_sl) {
        (Some(close), Some(initial_sl)) => {
            let risk = (trade.open_price - initial_sl) * sign;
            if risk > 0.0 {
                Some((close - trade.open_price) * sign / risk)
            } else {
                None
            }
        }
        _ => None,
    };

    let hold_duration_minutes = Some((close_time - trade.open_time).num_minutes());

    TradeCloseUpdate {
        close_price,
        close_time,
        close_reason,
        profit,
        commission,
        swap,
        exit_bid: latest_tick.map(|t| t.bid),
        exit_ask: latest_tick.map(|t| t.ask),
        exit_spread: latest_tick.map(|t| t.spread),
        session: Some(Session::at(close_time)),
        pips_captured,
        risk_reward_realized,
        hold_duration_minutes,
    }
}
