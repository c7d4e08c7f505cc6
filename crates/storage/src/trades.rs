use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use trading_core::{
    CloseReason, HistoryEventType, Session, Trade, TradeDirection, TradeHistoryEvent, TradeSource,
};
use uuid::Uuid;

use crate::rows::TradeRow;
use crate::Store;

/// Fields needed to record a trade the EA reported or the server opened.
#[derive(Debug, Clone)]
pub struct NewTrade {
    pub ticket: i64,
    pub account_id: i64,
    pub symbol: String,
    pub direction: TradeDirection,
    pub volume: f64,
    pub open_price: f64,
    pub open_time: DateTime<Utc>,
    pub sl: Option<f64>,
    pub tp: Option<f64>,
    pub source: TradeSource,
    pub command_id: Option<Uuid>,
    pub signal_id: Option<i64>,
    pub entry_reason: Option<String>,
    pub entry_bid: Option<f64>,
    pub entry_ask: Option<f64>,
    pub entry_spread: Option<f64>,
}

/// Close-out annotations computed by the exit-metrics pass.
#[derive(Debug, Clone)]
pub struct TradeCloseUpdate {
    pub close_price: Option<f64>,
    pub close_time: DateTime<Utc>,
    pub close_reason: CloseReason,
    pub profit: Option<f64>,
    pub commission: Option<f64>,
    pub swap: Option<f64>,
    pub exit_bid: Option<f64>,
    pub exit_ask: Option<f64>,
    pub exit_spread: Option<f64>,
    pub session: Option<Session>,
    pub pips_captured: Option<f64>,
    pub risk_reward_realized: Option<f64>,
    pub hold_duration_minutes: Option<i64>,
}

impl Store {
    pub async fn create_trade(&self, t: &NewTrade) -> Result<i64> {
        sqlx::query(
            "INSERT INTO trades (ticket, account_id, symbol, direction, volume,
                open_price, open_time, sl, tp, initial_sl, initial_tp, original_tp,
                status, source, command_id, signal_id, entry_reason,
                entry_bid, entry_ask, entry_spread)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'open', ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(t.ticket)
        .bind(t.account_id)
        .bind(&t.symbol)
        .bind(t.direction.as_str())
        .bind(t.volume)
        .bind(t.open_price)
        .bind(t.open_time.to_rfc3339())
        .bind(t.sl)
        .bind(t.tp)
        .bind(t.sl)
        .bind(t.tp)
        .bind(t.tp)
        .bind(t.source.as_str())
        .bind(t.command_id.map(|c| c.to_string()))
        .bind(t.signal_id)
        .bind(&t.entry_reason)
        .bind(t.entry_bid)
        .bind(t.entry_ask)
        .bind(t.entry_spread)
        .execute(self.pool())
        .await?;

        let (id,): (i64,) = sqlx::query_as("SELECT last_insert_rowid()")
            .fetch_one(self.pool())
            .await?;
        Ok(id)
    }

    pub async fn get_trade(&self, trade_id: i64) -> Result<Option<Trade>> {
        let row: Option<TradeRow> = sqlx::query_as("SELECT * FROM trades WHERE id = ?")
            .bind(trade_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.map(Into::into))
    }

    pub async fn get_trade_by_ticket(&self, account_id: i64, ticket: i64) -> Result<Option<Trade>> {
        let row: Option<TradeRow> =
            sqlx::query_as("SELECT * FROM trades WHERE account_id = ? AND ticket = ?")
                .bind(account_id)
                .bind(ticket)
                .fetch_optional(self.pool())
                .await?;
        Ok(row.map(Into::into))
    }

    pub async fn list_open_trades(&self, account_id: i64) -> Result<Vec<Trade>> {
        let rows: Vec<TradeRow> = sqlx::query_as(
            "SELECT * FROM trades WHERE account_id = ? AND status = 'open' ORDER BY open_time",
        )
        .bind(account_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn list_all_open_trades(&self) -> Result<Vec<Trade>> {
        let rows: Vec<TradeRow> =
            sqlx::query_as("SELECT * FROM trades WHERE status = 'open' ORDER BY open_time")
                .fetch_all(self.pool())
                .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn count_open_trades(&self, account_id: i64) -> Result<i64> {
        let (n,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM trades WHERE account_id = ? AND status = 'open'")
                .bind(account_id)
                .fetch_one(self.pool())
                .await?;
        Ok(n)
    }

    pub async fn count_open_trades_for_symbol(
        &self,
        account_id: i64,
        symbol: &str,
    ) -> Result<i64> {
        let (n,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM trades
             WHERE account_id = ? AND symbol = ? AND status = 'open'",
        )
        .bind(account_id)
        .bind(symbol)
        .fetch_one(self.pool())
        .await?;
        Ok(n)
    }

    /// Move the stop loss, but only in the profit direction. Two racing
    /// movers resolve via this compare-and-set: the better (further in
    /// profit) SL wins and the loser's update affects zero rows.
    pub async fn update_sl_if_better(
        &self,
        trade_id: i64,
        direction: TradeDirection,
        new_sl: f64,
    ) -> Result<bool> {
        let condition = match direction {
            TradeDirection::Buy => "(sl IS NULL OR ? > sl)",
            TradeDirection::Sell => "(sl IS NULL OR ? < sl)",
        };
        let query = format!(
            "UPDATE trades SET sl = ?, trailing_stop_active = 1,
                trailing_stop_moves = trailing_stop_moves + 1
             WHERE id = ? AND status = 'open' AND {condition}"
        );

        let result = sqlx::query(&query)
            .bind(new_sl)
            .bind(trade_id)
            .bind(new_sl)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record a successful TP extension.
    pub async fn extend_tp(&self, trade_id: i64, new_tp: f64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE trades SET tp = ?, tp_extended_count = tp_extended_count + 1
             WHERE id = ? AND status = 'open' AND tp_extended_count < 5",
        )
        .bind(new_tp)
        .bind(trade_id)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Overwrite sl/tp from an EA report (the EA is authoritative).
    pub async fn set_trade_levels(
        &self,
        trade_id: i64,
        sl: Option<f64>,
        tp: Option<f64>,
    ) -> Result<()> {
        sqlx::query("UPDATE trades SET sl = ?, tp = ? WHERE id = ?")
            .bind(sl)
            .bind(tp)
            .bind(trade_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn update_excursions(&self, trade_id: i64, mfe: f64, mae: f64) -> Result<()> {
        sqlx::query(
            "UPDATE trades SET max_favorable_excursion = MAX(max_favorable_excursion, ?),
                max_adverse_excursion = MAX(max_adverse_excursion, ?)
             WHERE id = ? AND status = 'open'",
        )
        .bind(mfe)
        .bind(mae)
        .bind(trade_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn close_trade(&self, trade_id: i64, update: &TradeCloseUpdate) -> Result<()> {
        sqlx::query(
            "UPDATE trades SET status = 'closed', close_price = ?, close_time = ?,
                close_reason = ?, profit = ?, commission = ?, swap = ?,
                exit_bid = ?, exit_ask = ?, exit_spread = ?, session = ?,
                pips_captured = ?, risk_reward_realized = ?, hold_duration_minutes = ?
             WHERE id = ? AND status = 'open'",
        )
        .bind(update.close_price)
        .bind(update.close_time.to_rfc3339())
        .bind(update.close_reason.as_str())
        .bind(update.profit)
        .bind(update.commission)
        .bind(update.swap)
        .bind(update.exit_bid)
        .bind(update.exit_ask)
        .bind(update.exit_spread)
        .bind(update.session.map(|s| s.as_str()))
        .bind(update.pips_captured)
        .bind(update.risk_reward_realized)
        .bind(update.hold_duration_minutes)
        .bind(trade_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Force-close a trade that the EA no longer reports. PnL is left NULL
    /// until a later report supplies it.
    pub async fn close_trade_reconciled(&self, trade_id: i64) -> Result<()> {
        sqlx::query(
            "UPDATE trades SET status = 'closed', close_time = ?, close_reason = ?
             WHERE id = ? AND status = 'open'",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(CloseReason::SyncReconciliation.as_str())
        .bind(trade_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Override a generic MANUAL close with a worker-supplied reason.
    pub async fn override_close_reason(&self, trade_id: i64, reason: CloseReason) -> Result<()> {
        sqlx::query("UPDATE trades SET close_reason = ? WHERE id = ?")
            .bind(reason.as_str())
            .bind(trade_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn add_history_event(&self, event: &TradeHistoryEvent) -> Result<()> {
        sqlx::query(
            "INSERT INTO trade_history_events (trade_id, event_type, old_value, new_value,
                reason, source, price_at_change, spread_at_change, timestamp)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(event.trade_id)
        .bind(event.event_type.as_str())
        .bind(event.old_value)
        .bind(event.new_value)
        .bind(&event.reason)
        .bind(&event.source)
        .bind(event.price_at_change)
        .bind(event.spread_at_change)
        .bind(event.timestamp.to_rfc3339())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn list_history_events(&self, trade_id: i64) -> Result<Vec<TradeHistoryEvent>> {
        let rows: Vec<(i64, String, Option<f64>, Option<f64>, String, String, Option<f64>, Option<f64>, String)> =
            sqlx::query_as(
                "SELECT trade_id, event_type, old_value, new_value, reason, source,
                    price_at_change, spread_at_change, timestamp
                 FROM trade_history_events WHERE trade_id = ? ORDER BY id",
            )
            .bind(trade_id)
            .fetch_all(self.pool())
            .await?;

        Ok(rows
            .into_iter()
            .map(
                |(trade_id, event_type, old_value, new_value, reason, source, price, spread, ts)| {
                    TradeHistoryEvent {
                        trade_id,
                        event_type: match event_type.as_str() {
                            "TP_MODIFIED" => HistoryEventType::TpModified,
                            "VOLUME_MODIFIED" => HistoryEventType::VolumeModified,
                            _ => HistoryEventType::SlModified,
                        },
                        old_value,
                        new_value,
                        reason,
                        source,
                        price_at_change: price,
                        spread_at_change: spread,
                        timestamp: crate::parse_ts(&ts),
                    }
                },
            )
            .collect())
    }

    /// Find the server command that opened a ticket, for linking an EA-
    /// reported position back to its signal.
    pub async fn find_open_command_for_ticket(
        &self,
        account_id: i64,
        ticket: i64,
        symbol: &str,
        direction: TradeDirection,
    ) -> Result<Option<(Uuid, Option<i64>)>> {
        let row: Option<(String, Option<i64>)> = sqlx::query_as(
            "SELECT command_id, linked_signal_id FROM commands
             WHERE account_id = ? AND command_type = 'OPEN_TRADE' AND status = 'COMPLETED'
               AND json_extract(response, '$.ticket') = ?
               AND json_extract(payload, '$.symbol') = ?
               AND json_extract(payload, '$.order_type') = ?
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(account_id)
        .bind(ticket)
        .bind(symbol)
        .bind(direction.as_str())
        .fetch_optional(self.pool())
        .await?;

        Ok(row.and_then(|(id, signal_id)| Uuid::parse_str(&id).ok().map(|u| (u, signal_id))))
    }

    /// Most recent worker-issued CLOSE_TRADE for a ticket, used to replace a
    /// generic MANUAL close reason with the worker's.
    pub async fn find_close_command_reason(
        &self,
        account_id: i64,
        ticket: i64,
    ) -> Result<Option<String>> {
        let row: Option<(Option<String>,)> = sqlx::query_as(
            "SELECT json_extract(payload, '$.reason') FROM commands
             WHERE account_id = ? AND command_type = 'CLOSE_TRADE'
               AND json_extract(payload, '$.ticket') = ?
               AND status IN ('COMPLETED', 'EXECUTING', 'PENDING')
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(account_id)
        .bind(ticket)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.and_then(|(r,)| r))
    }

    /// Count SL-hit closes for a symbol inside a lookback window.
    pub async fn count_recent_sl_hits(&self, symbol: &str, window_hours: i64) -> Result<i64> {
        let cutoff = (Utc::now() - Duration::hours(window_hours)).to_rfc3339();
        let (n,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM trades
             WHERE symbol = ? AND status = 'closed' AND close_reason = 'SL_HIT'
               AND close_time >= ?",
        )
        .bind(symbol)
        .bind(cutoff)
        .fetch_one(self.pool())
        .await?;
        Ok(n)
    }

    /// Rolling (wins, total, profit) over closed trades in the last 24h.
    pub async fn symbol_rolling_stats(&self, symbol: &str) -> Result<(i64, i64, f64)> {
        let cutoff = (Utc::now() - Duration::hours(24)).to_rfc3339();
        let row: (i64, i64, Option<f64>) = sqlx::query_as(
            "SELECT
                COALESCE(SUM(CASE WHEN COALESCE(profit, 0) > 0 THEN 1 ELSE 0 END), 0),
                COUNT(*),
                SUM(COALESCE(profit, 0))
             FROM trades
             WHERE symbol = ? AND status = 'closed' AND close_time >= ?",
        )
        .bind(symbol)
        .bind(cutoff)
        .fetch_one(self.pool())
        .await?;
        Ok((row.0, row.1, row.2.unwrap_or(0.0)))
    }
}
