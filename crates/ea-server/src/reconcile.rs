use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use storage::{NewTrade, Store};
use trading_core::{
    HistoryEventType, SignalStatus, TradeDirection, TradeHistoryEvent, TradeSource,
};

/// One position as the EA reports it in a full sync.
#[derive(Debug, Clone, Deserialize)]
pub struct EaPosition {
    pub ticket: i64,
    pub symbol: String,
    pub order_type: String,
    pub volume: f64,
    pub open_price: f64,
    #[serde(default)]
    pub open_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sl: Option<f64>,
    #[serde(default)]
    pub tp: Option<f64>,
    #[serde(default)]
    pub profit: Option<f64>,
}

#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct ReconcileSummary {
    pub closed: usize,
    pub created: usize,
    pub updated: usize,
}

/// The EA's position list is the truth. Open DB trades
/// absent from the payload are force-closed; unknown payload positions are
/// created and, where possible, linked back to the command that opened
/// them.
pub async fn reconcile_positions(
    store: &Store,
    account_id: i64,
    positions: &[EaPosition],
) -> Result<ReconcileSummary> {
    let mut summary = ReconcileSummary::default();
    let db_open = store.list_open_trades(account_id).await?;
    let ea_tickets: std::collections::HashSet<i64> = positions.iter().map(|p| p.ticket).collect();

    // 1. Anything we think is open that the EA no longer reports is closed.
    //    PnL stays unknown until a later report supplies it.
    for trade in &db_open {
        if !ea_tickets.contains(&trade.ticket) {
            tracing::warn!(
                "Reconciliation closing trade #{} {} (absent from EA sync)",
                trade.ticket,
                trade.symbol
            );
            store.close_trade_reconciled(trade.id).await?;
            summary.closed += 1;
        }
    }

    // 2. Update or adopt every reported position.
    for position in positions {
        let direction = match TradeDirection::parse(&position.order_type) {
            Some(d) => d,
            None => {
                tracing::warn!(
                    "Sync entry #{} has unknown order type {:?}, skipped",
                    position.ticket,
                    position.order_type
                );
                continue;
            }
        };

        match store.get_trade_by_ticket(account_id, position.ticket).await? {
            Some(existing) => {
                let sl_changed = differs(existing.sl, position.sl);
                let tp_changed = differs(existing.tp, position.tp);
                if sl_changed || tp_changed {
                    store
                        .set_trade_levels(existing.id, position.sl, position.tp)
                        .await?;
                    if sl_changed {
                        store
                            .add_history_event(&level_event(
                                existing.id,
                                HistoryEventType::SlModified,
                                existing.sl,
                                position.sl,
                            ))
                            .await?;
                    }
                    if tp_changed {
                        store
                            .add_history_event(&level_event(
                                existing.id,
                                HistoryEventType::TpModified,
                                existing.tp,
                                position.tp,
                            ))
                            .await?;
                    }
                    summary.updated += 1;
                }
            }
            None => {
                adopt_position(store, account_id, position, direction).await?;
                summary.created += 1;
            }
        }
    }

    Ok(summary)
}

fn differs(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (Some(x), Some(y)) => (x - y).abs() > 1e-9,
        (None, None) => false,
        _ => true,
    }
}

fn level_event(
    trade_id: i64,
    event_type: HistoryEventType,
    old: Option<f64>,
    new: Option<f64>,
) -> TradeHistoryEvent {
    TradeHistoryEvent {
        trade_id,
        event_type,
        old_value: old,
        new_value: new,
        reason: "EA sync".to_string(),
        source: "trades_sync".to_string(),
        price_at_change: None,
        spread_at_change: None,
        timestamp: Utc::now(),
    }
}

/// Create a trade for an EA position we have no row for, linking it to the
/// opening command (and through it the signal) when one matches.
async fn adopt_position(
    store: &Store,
    account_id: i64,
    position: &EaPosition,
    direction: TradeDirection,
) -> Result<()> {
    let link = store
        .find_open_command_for_ticket(account_id, position.ticket, &position.symbol, direction)
        .await?;

    let (source, command_id, signal_id, entry_reason) = match link {
        Some((command_id, signal_id)) => {
            let entry_reason = match signal_id {
                Some(id) => match store.get_signal(id).await? {
                    Some(signal) => {
                        // The signal did its job once a position exists.
                        store.set_signal_status(id, SignalStatus::Executed).await?;
                        format!(
                            "Auto {} {} @ {:.0}% confidence",
                            signal.signal_type.as_str(),
                            signal.timeframe.name(),
                            signal.confidence
                        )
                    }
                    None => "Auto-trade".to_string(),
                },
                None => "Auto-trade".to_string(),
            };
            (TradeSource::Autotrade, Some(command_id), signal_id, entry_reason)
        }
        None => (TradeSource::Mt5, None, None, "Manual (MT5)".to_string()),
    };

    let latest = store.latest_tick(&position.symbol).await?;
    let id = store
        .create_trade(&NewTrade {
            ticket: position.ticket,
            account_id,
            symbol: position.symbol.clone(),
            direction,
            volume: position.volume,
            open_price: position.open_price,
            open_time: position.open_time.unwrap_or_else(Utc::now),
            sl: position.sl,
            tp: position.tp,
            source,
            command_id,
            signal_id,
            entry_reason: Some(entry_reason),
            entry_bid: latest.as_ref().map(|t| t.bid),
            entry_ask: latest.as_ref().map(|t| t.ask),
            entry_spread: latest.as_ref().map(|t| t.spread),
        })
        .await?;

    tracing::info!(
        "Adopted position #{} {} {} {} (trade {}, source {})",
        position.ticket,
        position.symbol,
        direction.as_str(),
        position.volume,
        id,
        source.as_str()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use trading_core::{
        Command, CommandPriority, CommandStatus, CommandType, SignalType, Timeframe, TradeStatus,
    };

    async fn setup_store() -> Store {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = Store::new(pool);
        store.init_tables().await.unwrap();
        store
    }

    fn position(ticket: i64, symbol: &str, sl: Option<f64>, tp: Option<f64>) -> EaPosition {
        EaPosition {
            ticket,
            symbol: symbol.to_string(),
            order_type: "BUY".to_string(),
            volume: 0.1,
            open_price: 1.085,
            open_time: Some(Utc::now()),
            sl,
            tp,
            profit: None,
        }
    }

    async fn seed_open(store: &Store, ticket: i64) -> i64 {
        store
            .create_trade(&NewTrade {
                ticket,
                account_id: 1,
                symbol: "EURUSD".to_string(),
                direction: TradeDirection::Buy,
                volume: 0.1,
                open_price: 1.085,
                open_time: Utc::now(),
                sl: Some(1.084),
                tp: Some(1.088),
                source: TradeSource::Autotrade,
                command_id: None,
                signal_id: None,
                entry_reason: None,
                entry_bid: None,
                entry_ask: None,
                entry_spread: None,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn missing_tickets_closed_with_sync_reason() {
        let store = setup_store().await;
        let a = seed_open(&store, 1).await;
        let b = seed_open(&store, 2).await;
        let c = seed_open(&store, 3).await;

        // EA reports only tickets 1 and 2
        let summary = reconcile_positions(
            &store,
            1,
            &[
                position(1, "EURUSD", Some(1.084), Some(1.088)),
                position(2, "EURUSD", Some(1.084), Some(1.088)),
            ],
        )
        .await
        .unwrap();

        assert_eq!(summary.closed, 1);
        let closed = store.get_trade(c).await.unwrap().unwrap();
        assert_eq!(closed.status, TradeStatus::Closed);
        assert_eq!(
            closed.close_reason,
            Some(trading_core::CloseReason::SyncReconciliation)
        );
        assert!(closed.profit.is_none());

        // The surviving trades stay open and untouched
        for id in [a, b] {
            let t = store.get_trade(id).await.unwrap().unwrap();
            assert_eq!(t.status, TradeStatus::Open);
        }

        // Post-condition: every open DB ticket is in the EA set
        let open = store.list_open_trades(1).await.unwrap();
        assert!(open.iter().all(|t| [1, 2].contains(&t.ticket)));
    }

    #[tokio::test]
    async fn level_changes_append_history() {
        let store = setup_store().await;
        let id = seed_open(&store, 1).await;

        let summary = reconcile_positions(
            &store,
            1,
            &[position(1, "EURUSD", Some(1.0845), Some(1.089))],
        )
        .await
        .unwrap();
        assert_eq!(summary.updated, 1);

        let trade = store.get_trade(id).await.unwrap().unwrap();
        assert_eq!(trade.sl, Some(1.0845));
        assert_eq!(trade.tp, Some(1.089));

        let events = store.list_history_events(id).await.unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().any(|e| e.event_type == HistoryEventType::SlModified));
        assert!(events.iter().any(|e| e.event_type == HistoryEventType::TpModified));
        assert!(events.iter().all(|e| e.source == "trades_sync"));
    }

    #[tokio::test]
    async fn unknown_position_adopted_as_manual() {
        let store = setup_store().await;

        let summary = reconcile_positions(&store, 1, &[position(99, "GBPUSD", None, None)])
            .await
            .unwrap();
        assert_eq!(summary.created, 1);

        let trade = store.get_trade_by_ticket(1, 99).await.unwrap().unwrap();
        assert_eq!(trade.source, TradeSource::Mt5);
        assert_eq!(trade.entry_reason.as_deref(), Some("Manual (MT5)"));
    }

    #[tokio::test]
    async fn completed_command_links_adopted_position() {
        let store = setup_store().await;

        // A completed OPEN_TRADE whose response carries ticket 77
        let signal = store
            .upsert_signal(
                1,
                "EURUSD",
                Timeframe::H1,
                SignalType::Buy,
                78.0,
                1.085,
                Some(1.084),
                Some(1.088),
                &json!({}),
            )
            .await
            .unwrap();
        let mut cmd = Command::new(
            1,
            CommandType::OpenTrade,
            json!({"symbol": "EURUSD", "order_type": "BUY", "volume": 0.1}),
            CommandPriority::Normal,
        );
        cmd.linked_signal_id = Some(signal.signal_id());
        store.insert_command(&cmd).await.unwrap();
        store.mark_command_sent(cmd.command_id).await.unwrap();
        store
            .apply_command_response(&storage::CommandUpdate {
                command_id: cmd.command_id,
                status: CommandStatus::Completed,
                response: Some(json!({"ticket": 77, "open_price": 1.0851})),
                error_message: None,
            })
            .await
            .unwrap();

        reconcile_positions(&store, 1, &[position(77, "EURUSD", Some(1.084), Some(1.088))])
            .await
            .unwrap();

        let trade = store.get_trade_by_ticket(1, 77).await.unwrap().unwrap();
        assert_eq!(trade.source, TradeSource::Autotrade);
        assert_eq!(trade.command_id, Some(cmd.command_id));
        assert_eq!(trade.signal_id, Some(signal.signal_id()));
        assert!(trade.entry_reason.unwrap().contains("78% confidence"));

        // Round-trip law: exactly one trade carries this command and ticket
        let signal_row = store.get_signal(signal.signal_id()).await.unwrap().unwrap();
        assert_eq!(signal_row.status, SignalStatus::Executed);
    }

    #[tokio::test]
    async fn idempotent_resync() {
        let store = setup_store().await;
        seed_open(&store, 1).await;

        let payload = [position(1, "EURUSD", Some(1.084), Some(1.088))];
        let first = reconcile_positions(&store, 1, &payload).await.unwrap();
        let second = reconcile_positions(&store, 1, &payload).await.unwrap();

        assert_eq!(first.closed + first.created + first.updated, 0);
        assert_eq!(second.closed + second.created + second.updated, 0);
    }
}
