use anyhow::Result;
use chrono::Utc;
use storage::NewTrade;
use trading_core::{Command, SignalStatus, TradeDirection, TradeSource};

use crate::state::AppState;

/// Record the trade a completed OPEN_TRADE produced. The next trades_sync
/// would adopt it anyway; creating it here makes the round trip immediate
/// and idempotent (the sync path finds the row by ticket).
pub async fn record_opened_trade(
    state: &AppState,
    command: &Command,
    ticket: i64,
    open_price: Option<f64>,
) -> Result<()> {
    if state
        .store
        .get_trade_by_ticket(command.account_id, ticket)
        .await?
        .is_some()
    {
        return Ok(());
    }

    let payload = &command.payload;
    let symbol = payload
        .get("symbol")
        .and_then(|s| s.as_str())
        .unwrap_or_default()
        .to_string();
    let direction = payload
        .get("order_type")
        .and_then(|s| s.as_str())
        .and_then(TradeDirection::parse)
        .unwrap_or(TradeDirection::Buy);
    let volume = payload.get("volume").and_then(|v| v.as_f64()).unwrap_or(0.0);
    let sl = payload.get("sl").and_then(|v| v.as_f64());
    let tp = payload.get("tp").and_then(|v| v.as_f64());

    let entry_reason = match command.linked_signal_id {
        Some(signal_id) => {
            let reason = match state.store.get_signal(signal_id).await? {
                Some(signal) => format!(
                    "Auto {} {} @ {:.0}% confidence",
                    signal.signal_type.as_str(),
                    signal.timeframe.name(),
                    signal.confidence
                ),
                None => "Auto-trade".to_string(),
            };
            state
                .store
                .set_signal_status(signal_id, SignalStatus::Executed)
                .await?;
            reason
        }
        None => "Auto-trade".to_string(),
    };

    let latest = state.ticks.latest(&symbol);
    let entry = open_price
        .or_else(|| latest.as_ref().map(|t| match direction {
            TradeDirection::Buy => t.ask,
            TradeDirection::Sell => t.bid,
        }))
        .unwrap_or_default();

    let trade_id = state
        .store
        .create_trade(&NewTrade {
            ticket,
            account_id: command.account_id,
            symbol: symbol.clone(),
            direction,
            volume,
            open_price: entry,
            open_time: Utc::now(),
            sl,
            tp,
            source: TradeSource::Autotrade,
            command_id: Some(command.command_id),
            signal_id: command.linked_signal_id,
            entry_reason: Some(entry_reason),
            entry_bid: latest.as_ref().map(|t| t.bid),
            entry_ask: latest.as_ref().map(|t| t.ask),
            entry_spread: latest.as_ref().map(|t| t.spread),
        })
        .await?;

    tracing::info!(
        "Trade opened: #{} {} {} {:.2} lots @ {:.5} (trade {}, command {})",
        ticket,
        symbol,
        direction.as_str(),
        volume,
        entry,
        trade_id,
        command.command_id
    );
    Ok(())
}
