use std::sync::Arc;

use chrono::Utc;
use command_queue::CommandQueue;
use storage::{NewTrade, Store, TradeCloseUpdate};
use trading_core::{
    Account, CloseReason, CommandType, GlobalSettings, Session, TradeDirection, TradeSource,
};

use crate::breaker::CircuitBreaker;
use crate::pause::SymbolPauseRegistry;
use crate::workers::{note_sl_hit, refresh_symbol_performance, symbol_in_news_pause};

async fn setup_store() -> Store {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory SQLite");
    let store = Store::new(pool);
    store.init_tables().await.unwrap();
    store
}

fn account(balance: f64, initial: f64, profit_today: f64) -> Account {
    Account {
        id: 1,
        broker_account_number: 100,
        broker_name: "TestBroker".to_string(),
        currency: "EUR".to_string(),
        balance,
        equity: balance,
        margin: 0.0,
        free_margin: balance,
        initial_balance: initial,
        profit_today,
        created_at: Utc::now(),
    }
}

async fn close_trade_with(
    store: &Store,
    ticket: i64,
    symbol: &str,
    reason: CloseReason,
    profit: f64,
) {
    let id = store
        .create_trade(&NewTrade {
            ticket,
            account_id: 1,
            symbol: symbol.to_string(),
            direction: TradeDirection::Buy,
            volume: 0.1,
            open_price: 1.085,
            open_time: Utc::now() - chrono::Duration::hours(1),
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
        .unwrap();
    store
        .close_trade(
            id,
            &TradeCloseUpdate {
                close_price: Some(1.084),
                close_time: Utc::now(),
                close_reason: reason,
                profit: Some(profit),
                commission: None,
                swap: None,
                exit_bid: None,
                exit_ask: None,
                exit_spread: None,
                session: Some(Session::London),
                pips_captured: None,
                risk_reward_realized: None,
                hold_duration_minutes: Some(60),
            },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn breaker_trips_on_daily_loss() {
    let store = setup_store().await;
    let breaker = CircuitBreaker::new(store.clone());
    let settings = GlobalSettings::default();

    // -6% day against a 5% limit
    let acct = account(10_000.0, 10_000.0, -600.0);
    let reason = breaker.check(&acct, &settings).await.unwrap();
    assert!(reason.unwrap().contains("Daily loss"));
    assert!(breaker.state(1).tripped);

    // The trip wrote a CRITICAL audit row
    assert_eq!(store.count_decisions(1, "CIRCUIT_BREAKER").await.unwrap(), 1);
}

#[tokio::test]
async fn breaker_trips_on_total_drawdown() {
    let store = setup_store().await;
    let breaker = CircuitBreaker::new(store.clone());
    let settings = GlobalSettings::default();

    // 25% under the initial balance against a 20% limit
    let acct = account(7_500.0, 10_000.0, 0.0);
    let reason = breaker.check(&acct, &settings).await.unwrap();
    assert!(reason.unwrap().contains("drawdown"));
}

#[tokio::test]
async fn breaker_trips_after_three_failed_opens() {
    let store = setup_store().await;
    let breaker = CircuitBreaker::new(store.clone());

    breaker.record_failed_open(1).await.unwrap();
    breaker.record_failed_open(1).await.unwrap();
    assert!(!breaker.state(1).tripped);

    breaker.record_failed_open(1).await.unwrap();
    let state = breaker.state(1);
    assert!(state.tripped);
    assert_eq!(state.failed_command_count, 3);

    // A healthy account still gates on the tripped flag
    let settings = GlobalSettings::default();
    let reason = breaker.check(&account(10_000.0, 10_000.0, 0.0), &settings).await.unwrap();
    assert!(reason.is_some());
}

#[tokio::test]
async fn breaker_reset_clears_failures() {
    let store = setup_store().await;
    let breaker = CircuitBreaker::new(store.clone());

    for _ in 0..3 {
        breaker.record_failed_open(1).await.unwrap();
    }
    assert!(breaker.state(1).tripped);

    breaker.reset(1).await.unwrap();
    let state = breaker.state(1);
    assert!(!state.tripped);
    assert_eq!(state.failed_command_count, 0);

    let settings = GlobalSettings::default();
    let reason = breaker.check(&account(10_000.0, 10_000.0, 0.0), &settings).await.unwrap();
    assert!(reason.is_none());
}

#[tokio::test]
async fn success_clears_failure_streak() {
    let store = setup_store().await;
    let breaker = CircuitBreaker::new(store.clone());

    breaker.record_failed_open(1).await.unwrap();
    breaker.record_failed_open(1).await.unwrap();
    breaker.record_successful_open(1);
    breaker.record_failed_open(1).await.unwrap();
    // 2 failures, success, 1 failure: streak is 1, no trip
    assert!(!breaker.state(1).tripped);
}

#[tokio::test]
async fn two_sl_hits_pause_symbol() {
    let store = setup_store().await;
    let pauses = SymbolPauseRegistry::new();

    close_trade_with(&store, 1, "XAUUSD", CloseReason::SlHit, -50.0).await;
    note_sl_hit(&store, &pauses, "XAUUSD", 1).await.unwrap();
    assert!(!pauses.is_paused("XAUUSD"), "one hit is not enough");

    close_trade_with(&store, 2, "XAUUSD", CloseReason::SlHit, -60.0).await;
    note_sl_hit(&store, &pauses, "XAUUSD", 1).await.unwrap();
    assert!(pauses.is_paused("XAUUSD"));

    // The pause wrote a RISK_LIMIT decision
    assert_eq!(store.count_decisions(1, "RISK_LIMIT").await.unwrap(), 1);

    // Other symbols are unaffected
    assert!(!pauses.is_paused("EURUSD"));
}

#[tokio::test]
async fn tp_hits_do_not_pause() {
    let store = setup_store().await;
    let pauses = SymbolPauseRegistry::new();

    close_trade_with(&store, 1, "EURUSD", CloseReason::TpHit, 80.0).await;
    close_trade_with(&store, 2, "EURUSD", CloseReason::TpHit, 90.0).await;
    note_sl_hit(&store, &pauses, "EURUSD", 1).await.unwrap();
    assert!(!pauses.is_paused("EURUSD"));
}

#[tokio::test]
async fn emergency_close_commands_on_critical_drawdown() {
    let store = setup_store().await;
    let queue = Arc::new(CommandQueue::new(store.clone()));
    let breaker = Arc::new(CircuitBreaker::new(store.clone()));

    let acct = store
        .get_or_create_account(100, "TestBroker", "EUR", 10_000.0)
        .await
        .unwrap();

    // An open position and a closed loss worth -8% of balance (1.5x the 5%
    // limit is 7.5%)
    store
        .create_trade(&NewTrade {
            ticket: 10,
            account_id: acct.id,
            symbol: "EURUSD".to_string(),
            direction: TradeDirection::Buy,
            volume: 0.1,
            open_price: 1.085,
            open_time: Utc::now(),
            sl: None,
            tp: None,
            source: TradeSource::Autotrade,
            command_id: None,
            signal_id: None,
            entry_reason: None,
            entry_bid: None,
            entry_ask: None,
            entry_spread: None,
        })
        .await
        .unwrap();
    close_trade_with(&store, 11, "GBPUSD", CloseReason::SlHit, -800.0).await;

    crate::workers::drawdown_pass(&store, &queue, &breaker)
        .await
        .unwrap();

    let batch = queue.next_batch(acct.id, 10).await.unwrap();
    let close = batch
        .iter()
        .find(|c| c.command_type == CommandType::CloseTrade)
        .expect("emergency close command");
    assert_eq!(
        close.payload.get("reason").and_then(|r| r.as_str()),
        Some("EMERGENCY_CLOSE")
    );
    assert_eq!(store.count_decisions(acct.id, "EMERGENCY_CLOSE").await.unwrap(), 1);
}

#[tokio::test]
async fn symbol_performance_disables_after_losses() {
    let store = setup_store().await;

    for i in 0..6 {
        close_trade_with(&store, 100 + i, "GBPJPY", CloseReason::SlHit, -40.0).await;
    }
    refresh_symbol_performance(&store, "GBPJPY").await.unwrap();
    assert!(store.is_symbol_disabled("GBPJPY").await.unwrap());
}

#[tokio::test]
async fn news_pause_matches_symbol_currencies() {
    let pauses = SymbolPauseRegistry::new();
    pauses.pause("USD", 10);

    assert!(symbol_in_news_pause(&pauses, "EURUSD"));
    assert!(symbol_in_news_pause(&pauses, "XAUUSD"));
    assert!(!symbol_in_news_pause(&pauses, "EURGBP"));
}
