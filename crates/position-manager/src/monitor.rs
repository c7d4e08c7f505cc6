use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use command_queue::CommandQueue;
use serde_json::json;
use storage::Store;
use trading_core::{
    CommandPriority, CommandType, GlobalSettings, HistoryEventType, Tick, Trade, TradeDirection,
    TradeHistoryEvent,
};

use crate::trailing::TrailingEngine;

/// Tick-driven management of open trades: excursion tracking, trailing
/// stop moves and dynamic TP extension.
pub struct PositionMonitor {
    store: Store,
    queue: Arc<CommandQueue>,
    trailing: TrailingEngine,
    settings: GlobalSettings,
}

impl PositionMonitor {
    pub fn new(store: Store, queue: Arc<CommandQueue>, settings: GlobalSettings) -> Self {
        let trailing = TrailingEngine::new(settings.trailing_stage_triggers, 10);
        Self {
            store,
            queue,
            trailing,
            settings,
        }
    }

    /// Fan one tick out over every open trade on its symbol.
    pub async fn on_tick(&self, tick: &Tick) -> Result<()> {
        let trades = self.store.list_all_open_trades().await?;
        for trade in trades.iter().filter(|t| t.symbol == tick.symbol) {
            if let Err(e) = self.manage_trade(trade, tick).await {
                tracing::warn!("Managing trade #{} failed: {}", trade.ticket, e);
            }
        }
        Ok(())
    }

    async fn manage_trade(&self, trade: &Trade, tick: &Tick) -> Result<()> {
        // Exit-side price: a BUY closes at bid, a SELL at ask.
        let price = match trade.direction {
            TradeDirection::Buy => tick.bid,
            TradeDirection::Sell => tick.ask,
        };

        self.track_excursions(trade, price).await?;
        self.apply_trailing(trade, price, tick).await?;
        if self.settings.dynamic_tp_enabled {
            self.apply_tp_extension(trade, price, tick).await?;
        }
        Ok(())
    }

    async fn track_excursions(&self, trade: &Trade, price: f64) -> Result<()> {
        let moved = (price - trade.open_price) * trade.direction.sign();
        let (mfe, mae) = if moved >= 0.0 { (moved, 0.0) } else { (0.0, -moved) };
        self.store.update_excursions(trade.id, mfe, mae).await
    }

    async fn apply_trailing(&self, trade: &Trade, price: f64, tick: &Tick) -> Result<()> {
        let broker = self
            .store
            .get_broker_symbol(trade.account_id, &trade.symbol)
            .await?
            .unwrap_or_else(|| trading_core::BrokerSymbolInfo::fallback(trade.account_id, &trade.symbol));

        let decision = match self
            .trailing
            .evaluate(trade, price, tick.spread, &broker, Utc::now())
        {
            Some(d) => d,
            None => return Ok(()),
        };

        // Compare-and-set: a racing move with a better SL wins and this one
        // becomes a no-op.
        if !self
            .store
            .update_sl_if_better(trade.id, trade.direction, decision.new_sl)
            .await?
        {
            return Ok(());
        }

        self.store
            .add_history_event(&TradeHistoryEvent {
                trade_id: trade.id,
                event_type: HistoryEventType::SlModified,
                old_value: trade.sl,
                new_value: Some(decision.new_sl),
                reason: format!(
                    "{} at {:.1}% of TP",
                    decision.stage.name(),
                    decision.progress_percent
                ),
                source: "trailing_stop_manager".to_string(),
                price_at_change: Some(price),
                spread_at_change: Some(tick.spread),
                timestamp: Utc::now(),
            })
            .await?;

        self.queue
            .enqueue(
                trade.account_id,
                CommandType::ModifyTrade,
                json!({
                    "ticket": trade.ticket,
                    "sl": decision.new_sl,
                    "tp": trade.tp,
                    "reason": decision.stage.name(),
                }),
                CommandPriority::High,
                None,
            )
            .await?;

        tracing::info!(
            "Trailing {} #{}: SL -> {:.5} ({} at {:.0}%)",
            trade.symbol,
            trade.ticket,
            decision.new_sl,
            decision.stage.name(),
            decision.progress_percent
        );
        Ok(())
    }

    async fn apply_tp_extension(&self, trade: &Trade, price: f64, tick: &Tick) -> Result<()> {
        if trade.tp_extended_count >= 5 {
            return Ok(());
        }
        let (tp, original_tp) = match (trade.tp, trade.original_tp) {
            (Some(tp), Some(orig)) => (tp, orig),
            _ => return Ok(()),
        };
        let progress = match TrailingEngine::progress_percent(trade, price) {
            Some(p) => p,
            None => return Ok(()),
        };
        if progress < self.settings.tp_extension_trigger_percent {
            return Ok(());
        }

        let extension = self.settings.tp_extension_multiplier * (original_tp - trade.open_price);
        let new_tp = tp + extension;

        // Never extend onto the wrong side of the current price.
        let valid = match trade.direction {
            TradeDirection::Buy => new_tp > price,
            TradeDirection::Sell => new_tp < price,
        };
        if !valid {
            return Ok(());
        }

        // The DB update happens when the EA confirms the modify; see
        // handle_modify_response.
        self.queue
            .enqueue(
                trade.account_id,
                CommandType::ModifyTrade,
                json!({
                    "ticket": trade.ticket,
                    "sl": trade.sl,
                    "tp": new_tp,
                    "reason": "dynamic_extension",
                }),
                CommandPriority::Normal,
                None,
            )
            .await?;

        tracing::info!(
            "TP extension {} #{}: {:.5} -> {:.5} (progress {:.0}%, extension {} of 5)",
            trade.symbol,
            trade.ticket,
            tp,
            new_tp,
            progress,
            trade.tp_extended_count + 1
        );
        Ok(())
    }

    /// Completion hook for MODIFY_TRADE commands. TP extensions are applied
    /// to the trade row only once the EA confirms them.
    pub async fn handle_modify_response(
        &self,
        account_id: i64,
        payload: &serde_json::Value,
        success: bool,
    ) -> Result<()> {
        if !success {
            return Ok(());
        }
        let reason = payload.get("reason").and_then(|r| r.as_str()).unwrap_or("");
        if reason != "dynamic_extension" {
            return Ok(());
        }
        let (ticket, new_tp) = match (
            payload.get("ticket").and_then(|t| t.as_i64()),
            payload.get("tp").and_then(|t| t.as_f64()),
        ) {
            (Some(t), Some(tp)) => (t, tp),
            _ => return Ok(()),
        };

        let trade = match self.store.get_trade_by_ticket(account_id, ticket).await? {
            Some(t) => t,
            None => return Ok(()),
        };
        if !self.store.extend_tp(trade.id, new_tp).await? {
            return Ok(());
        }

        self.store
            .add_history_event(&TradeHistoryEvent {
                trade_id: trade.id,
                event_type: HistoryEventType::TpModified,
                old_value: trade.tp,
                new_value: Some(new_tp),
                reason: "dynamic_extension".to_string(),
                source: "position_manager".to_string(),
                price_at_change: None,
                spread_at_change: None,
                timestamp: Utc::now(),
            })
            .await?;
        Ok(())
    }

    pub fn forget_trade(&self, trade_id: i64) {
        self.trailing.forget(trade_id);
    }
}
