use std::sync::Arc;

use chrono::Utc;
use command_queue::CommandQueue;
use market_data::{SpreadStats, TickBuffer};
use risk_manager::{CircuitBreaker, SymbolPauseRegistry};
use serde_json::json;
use storage::Store;
use trading_core::{CommandType, SignalType, Tick, Timeframe};

use crate::{AutoTrader, EaHealth, GateOutcome};

struct AlwaysHealthy;
impl EaHealth for AlwaysHealthy {
    fn ea_is_healthy(&self, _account_id: i64) -> bool {
        true
    }
}

struct NeverHealthy;
impl EaHealth for NeverHealthy {
    fn ea_is_healthy(&self, _account_id: i64) -> bool {
        false
    }
}

struct Harness {
    store: Store,
    queue: Arc<CommandQueue>,
    breaker: Arc<CircuitBreaker>,
    sl_pauses: Arc<SymbolPauseRegistry>,
    ticks: Arc<TickBuffer>,
    trader: AutoTrader,
}

async fn harness_with_health(health: Arc<dyn EaHealth>) -> Harness {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory SQLite");
    let store = Store::new(pool);
    store.init_tables().await.unwrap();

    let queue = Arc::new(CommandQueue::new(store.clone()));
    let breaker = Arc::new(CircuitBreaker::new(store.clone()));
    let sl_pauses = Arc::new(SymbolPauseRegistry::new());
    let currency_pauses = Arc::new(SymbolPauseRegistry::new());
    let spreads = Arc::new(SpreadStats::new(60));
    let ticks = Arc::new(TickBuffer::new(1000, 1000));

    let trader = AutoTrader::new(
        store.clone(),
        Arc::clone(&queue),
        Arc::clone(&breaker),
        Arc::clone(&sl_pauses),
        currency_pauses,
        spreads,
        Arc::clone(&ticks),
        health,
    );
    Harness {
        store,
        queue,
        breaker,
        sl_pauses,
        ticks,
        trader,
    }
}

async fn harness() -> Harness {
    harness_with_health(Arc::new(AlwaysHealthy)).await
}

impl Harness {
    async fn seed_account(&self) -> i64 {
        self.store
            .get_or_create_account(100, "TestBroker", "EUR", 10_000.0)
            .await
            .unwrap()
            .id
    }

    async fn seed_signal(&self, account_id: i64, symbol: &str, confidence: f64) -> trading_core::Signal {
        let outcome = self
            .store
            .upsert_signal(
                account_id,
                symbol,
                Timeframe::H1,
                SignalType::Buy,
                confidence,
                1.08500,
                Some(1.08404),
                Some(1.08660),
                &json!({}),
            )
            .await
            .unwrap();
        self.store
            .get_signal(outcome.signal_id())
            .await
            .unwrap()
            .unwrap()
    }

    fn seed_tick(&self, symbol: &str) {
        self.ticks.push(Tick {
            symbol: symbol.to_string(),
            bid: 1.08500,
            ask: 1.08510,
            spread: 0.00010,
            timestamp: Utc::now(),
            volume: 1.0,
        });
    }
}

#[tokio::test]
async fn clean_signal_emits_open_trade() {
    let h = harness().await;
    let account_id = h.seed_account().await;
    let signal = h.seed_signal(account_id, "EURUSD", 78.0).await;
    h.seed_tick("EURUSD");

    let outcome = h.trader.execute_signal(&signal).await.unwrap();
    let command_id = match outcome {
        GateOutcome::Executed(id) => id,
        GateOutcome::Rejected(reason) => panic!("rejected: {}", reason),
    };

    let cmd = h.store.get_command(command_id).await.unwrap().unwrap();
    assert_eq!(cmd.command_type, CommandType::OpenTrade);
    assert_eq!(cmd.linked_signal_id, Some(signal.id));
    assert_eq!(cmd.payload.get("order_type").and_then(|v| v.as_str()), Some("BUY"));
    assert!(cmd.payload.get("volume").and_then(|v| v.as_f64()).unwrap() > 0.0);

    // Deliverable to the EA
    let batch = h.queue.next_batch(account_id, 10).await.unwrap();
    assert_eq!(batch.len(), 1);
}

#[tokio::test]
async fn tripped_breaker_blocks_at_first_gate() {
    let h = harness().await;
    let account_id = h.seed_account().await;
    let signal = h.seed_signal(account_id, "EURUSD", 78.0).await;
    h.seed_tick("EURUSD");

    for _ in 0..3 {
        h.breaker.record_failed_open(account_id).await.unwrap();
    }

    let outcome = h.trader.execute_signal(&signal).await.unwrap();
    match outcome {
        GateOutcome::Rejected(reason) => assert!(reason.contains("Circuit breaker")),
        other => panic!("expected rejection, got {:?}", other),
    }
    // No command emitted
    assert!(h.queue.next_batch(account_id, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn unhealthy_ea_blocks() {
    let h = harness_with_health(Arc::new(NeverHealthy)).await;
    let account_id = h.seed_account().await;
    let signal = h.seed_signal(account_id, "EURUSD", 78.0).await;
    h.seed_tick("EURUSD");

    match h.trader.execute_signal(&signal).await.unwrap() {
        GateOutcome::Rejected(reason) => assert!(reason.contains("EA connection")),
        other => panic!("expected rejection, got {:?}", other),
    }
}

#[tokio::test]
async fn sl_cooldown_blocks_symbol() {
    let h = harness().await;
    let account_id = h.seed_account().await;
    let signal = h.seed_signal(account_id, "XAUUSD", 80.0).await;
    h.seed_tick("XAUUSD");
    h.sl_pauses.pause("XAUUSD", 60);

    match h.trader.execute_signal(&signal).await.unwrap() {
        GateOutcome::Rejected(reason) => assert!(reason.contains("cooldown")),
        other => panic!("expected rejection, got {:?}", other),
    }

    // The rejection was logged
    assert!(h.store.count_decisions(account_id, "TRADE_EXECUTION").await.unwrap() >= 1);
}

#[tokio::test]
async fn low_confidence_blocks() {
    let h = harness().await;
    let account_id = h.seed_account().await;
    let signal = h.seed_signal(account_id, "EURUSD", 55.0).await;
    h.seed_tick("EURUSD");

    match h.trader.execute_signal(&signal).await.unwrap() {
        GateOutcome::Rejected(reason) => assert!(reason.contains("Confidence")),
        other => panic!("expected rejection, got {:?}", other),
    }
}

#[tokio::test]
async fn stale_tick_blocks() {
    let h = harness().await;
    let account_id = h.seed_account().await;
    let signal = h.seed_signal(account_id, "EURUSD", 78.0).await;
    h.ticks.push(Tick {
        symbol: "EURUSD".to_string(),
        bid: 1.08500,
        ask: 1.08510,
        spread: 0.00010,
        timestamp: Utc::now() - chrono::Duration::seconds(120),
        volume: 1.0,
    });

    match h.trader.execute_signal(&signal).await.unwrap() {
        GateOutcome::Rejected(reason) => assert!(reason.contains("tick")),
        other => panic!("expected rejection, got {:?}", other),
    }
}

#[tokio::test]
async fn wide_spread_blocks() {
    let h = harness().await;
    let account_id = h.seed_account().await;
    let signal = h.seed_signal(account_id, "EURUSD", 78.0).await;
    // 8 pips on a major against a 3-pip cap
    h.ticks.push(Tick {
        symbol: "EURUSD".to_string(),
        bid: 1.08500,
        ask: 1.08580,
        spread: 0.00080,
        timestamp: Utc::now(),
        volume: 1.0,
    });

    match h.trader.execute_signal(&signal).await.unwrap() {
        GateOutcome::Rejected(reason) => assert!(reason.contains("Spread")),
        other => panic!("expected rejection, got {:?}", other),
    }
}

#[tokio::test]
async fn position_caps_block() {
    let h = harness().await;
    let account_id = h.seed_account().await;
    h.seed_tick("EURUSD");

    // Fill the per-symbol cap (2) with open trades
    for ticket in 1..=2 {
        h.store
            .create_trade(&storage::NewTrade {
                ticket,
                account_id,
                symbol: "EURUSD".to_string(),
                direction: trading_core::TradeDirection::Buy,
                volume: 0.1,
                open_price: 1.085,
                open_time: Utc::now(),
                sl: None,
                tp: None,
                source: trading_core::TradeSource::Autotrade,
                command_id: None,
                signal_id: None,
                entry_reason: None,
                entry_bid: None,
                entry_ask: None,
                entry_spread: None,
            })
            .await
            .unwrap();
    }

    let signal = h.seed_signal(account_id, "EURUSD", 78.0).await;
    match h.trader.execute_signal(&signal).await.unwrap() {
        GateOutcome::Rejected(reason) => assert!(reason.contains("Max positions for EURUSD")),
        other => panic!("expected rejection, got {:?}", other),
    }
}

#[tokio::test]
async fn correlation_blocks_third_aligned_position() {
    let h = harness().await;
    let account_id = h.seed_account().await;
    h.seed_tick("EURGBP");

    for (ticket, symbol) in [(1, "EURUSD"), (2, "GBPUSD")] {
        h.store
            .create_trade(&storage::NewTrade {
                ticket,
                account_id,
                symbol: symbol.to_string(),
                direction: trading_core::TradeDirection::Buy,
                volume: 0.1,
                open_price: 1.085,
                open_time: Utc::now(),
                sl: None,
                tp: None,
                source: trading_core::TradeSource::Autotrade,
                command_id: None,
                signal_id: None,
                entry_reason: None,
                entry_bid: None,
                entry_ask: None,
                entry_spread: None,
            })
            .await
            .unwrap();
    }

    let signal = h.seed_signal(account_id, "EURGBP", 78.0).await;
    match h.trader.execute_signal(&signal).await.unwrap() {
        GateOutcome::Rejected(reason) => assert!(reason.contains("correlated")),
        other => panic!("expected rejection, got {:?}", other),
    }
}

#[tokio::test]
async fn per_symbol_confidence_override_applies() {
    let h = harness().await;
    let account_id = h.seed_account().await;
    h.seed_tick("XAUUSD");
    h.store
        .upsert_symbol_override(&storage::SymbolOverride {
            symbol: "XAUUSD".to_string(),
            tp_atr_mult: None,
            sl_atr_mult: None,
            trailing_mult: None,
            min_confidence: Some(70.0),
        })
        .await
        .unwrap();

    // 67% passes the global 65% floor but not the symbol's 70%
    let signal = h.seed_signal(account_id, "XAUUSD", 67.0).await;
    match h.trader.execute_signal(&signal).await.unwrap() {
        GateOutcome::Rejected(reason) => assert!(reason.contains("below 70")),
        other => panic!("expected rejection, got {:?}", other),
    }
}

#[tokio::test]
async fn open_failures_feed_the_breaker() {
    let h = harness().await;
    let account_id = h.seed_account().await;

    // Two permanent failures and one retriable: streak is 2
    h.trader.handle_open_result(account_id, false, false).await.unwrap();
    h.trader.handle_open_result(account_id, false, true).await.unwrap();
    h.trader.handle_open_result(account_id, false, false).await.unwrap();
    assert!(!h.breaker.state(account_id).tripped);

    h.trader.handle_open_result(account_id, false, false).await.unwrap();
    assert!(h.breaker.state(account_id).tripped);

    // Success resets the streak after a manual reset
    h.breaker.reset(account_id).await.unwrap();
    h.trader.handle_open_result(account_id, true, false).await.unwrap();
    assert_eq!(h.breaker.state(account_id).failed_command_count, 0);
}
