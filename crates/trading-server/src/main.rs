use std::sync::Arc;

use anyhow::Result;
use auto_trader::AutoTrader;
use command_queue::CommandQueue;
use ea_server::{AppState, ConnectionRegistry};
use market_data::{SpreadStats, TickBuffer, TickFlusher};
use position_manager::PositionMonitor;
use risk_manager::{CircuitBreaker, SymbolPauseRegistry};
use signal_engine::{SignalEngine, WeightBook};
use storage::{Store, SymbolOverride};
use tokio::sync::broadcast;

mod config;

use config::ServerConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load .env, init tracing
    dotenvy::dotenv().ok();

    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }

    // Panic hook: log panic info before crashing
    std::panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
        tracing::error!("PANIC: {info}");
    }));

    tracing::info!("Starting EA trading server");

    // 2. Configuration
    let config = ServerConfig::from_env()?;
    tracing::info!("  Database: {}", config.database_url);
    tracing::info!("  Redis mirror: {}", config.redis_url.is_some());
    tracing::info!(
        "  Ports: control {}, ticks {}, trades {}, logs {}, ops {}",
        config.ports.control,
        config.ports.ticks,
        config.ports.trades,
        config.ports.logs,
        config.ports.ops
    );

    // 3. Storage
    let store = Store::connect(&config.database_url).await?;
    store.init_tables().await?;
    sqlx::query("SELECT 1").execute(store.pool()).await?;
    tracing::info!("Startup check: database OK");

    // 4. Trading settings: storage wins, defaults seed the first run
    let settings = store.load_settings().await?;
    store.save_settings(&settings).await?;
    tracing::info!("  Risk per trade: {}%", settings.risk_per_trade_percent);
    tracing::info!(
        "  Position limits: {} global, {} per symbol",
        settings.max_positions,
        settings.max_positions_per_symbol
    );
    tracing::info!("  Auto-trade confidence floor: {}%", settings.min_autotrade_confidence);
    tracing::info!("  Auto-trading enabled: {}", settings.autotrade_enabled);

    // Seed the XAUUSD tuning override once
    if store.get_symbol_override("XAUUSD").await?.is_none() {
        store
            .upsert_symbol_override(&SymbolOverride {
                symbol: "XAUUSD".to_string(),
                tp_atr_mult: None,
                sl_atr_mult: None,
                trailing_mult: Some(0.7),
                min_confidence: Some(70.0),
            })
            .await?;
    }

    // 5. Core components
    let ticks = Arc::new(TickBuffer::new(
        config.tick_ring_capacity,
        config.tick_flush_threshold,
    ));
    let spreads = Arc::new(SpreadStats::new(60));

    let mut queue = CommandQueue::new(store.clone());
    if let Some(redis_url) = &config.redis_url {
        match queue.with_redis(redis_url).await {
            Ok(q) => {
                queue = q;
                tracing::info!("Startup check: Redis OK");
            }
            Err(e) => {
                tracing::warn!("Redis mirror unavailable ({}), continuing without", e);
                queue = CommandQueue::new(store.clone());
            }
        }
    }
    let queue = Arc::new(queue);
    let restored = queue.rebuild_from_pending().await?;
    if restored > 0 {
        tracing::info!("Recovered {} pending commands from storage", restored);
    }

    let breaker = Arc::new(CircuitBreaker::new(store.clone()));
    let sl_pauses = Arc::new(SymbolPauseRegistry::new());
    let currency_pauses = Arc::new(SymbolPauseRegistry::new());
    let connections = Arc::new(ConnectionRegistry::new(settings.heartbeat_interval_seconds));

    let weights = match &config.weights_path {
        Some(path) => WeightBook::from_json_file(path)?,
        None => WeightBook::default(),
    };
    let engine = Arc::new(SignalEngine::new(store.clone(), weights, settings.clone()));
    let monitor = Arc::new(PositionMonitor::new(
        store.clone(),
        Arc::clone(&queue),
        settings.clone(),
    ));
    let trader = Arc::new(AutoTrader::new(
        store.clone(),
        Arc::clone(&queue),
        Arc::clone(&breaker),
        Arc::clone(&sl_pauses),
        Arc::clone(&currency_pauses),
        Arc::clone(&spreads),
        Arc::clone(&ticks),
        Arc::clone(&connections) as Arc<dyn auto_trader::EaHealth>,
    ));

    let state = AppState::new(
        store.clone(),
        Arc::clone(&queue),
        Arc::clone(&ticks),
        Arc::clone(&spreads),
        Arc::clone(&engine),
        Arc::clone(&monitor),
        Arc::clone(&trader),
        Arc::clone(&breaker),
        Arc::clone(&sl_pauses),
        Arc::clone(&currency_pauses),
        Arc::clone(&connections),
        settings.clone(),
    );

    // 6. Workers
    let (shutdown_tx, _) = broadcast::channel::<()>(8);

    let flusher = TickFlusher::new(Arc::clone(&ticks), store.clone());
    tokio::spawn(flusher.run(shutdown_tx.subscribe()));

    {
        let trader = Arc::clone(&trader);
        tokio::spawn(command_queue::run_timeout_worker(
            Arc::clone(&queue),
            shutdown_tx.subscribe(),
            move |expired| {
                if expired.command_type == trading_core::CommandType::OpenTrade {
                    let trader = Arc::clone(&trader);
                    tokio::spawn(async move {
                        if let Err(e) = trader
                            .handle_open_result(expired.account_id, false, false)
                            .await
                        {
                            tracing::warn!("Timeout hook failed: {}", e);
                        }
                    });
                }
            },
        ));
    }

    tokio::spawn(risk_manager::run_drawdown_worker(
        store.clone(),
        Arc::clone(&queue),
        Arc::clone(&breaker),
        shutdown_tx.subscribe(),
    ));
    tokio::spawn(risk_manager::run_sl_hit_worker(
        store.clone(),
        Arc::clone(&sl_pauses),
        shutdown_tx.subscribe(),
    ));
    tokio::spawn(risk_manager::run_timeout_worker(
        store.clone(),
        Arc::clone(&queue),
        shutdown_tx.subscribe(),
    ));
    tokio::spawn(risk_manager::run_strategy_validation_worker(
        store.clone(),
        Arc::clone(&queue),
        Arc::clone(&engine),
        shutdown_tx.subscribe(),
    ));
    tokio::spawn(risk_manager::run_news_pause_worker(
        store.clone(),
        Arc::clone(&currency_pauses),
        shutdown_tx.subscribe(),
    ));
    tokio::spawn(risk_manager::run_retention_worker(
        store.clone(),
        shutdown_tx.subscribe(),
    ));

    // Idle EA sessions drop out of the registry after an hour of silence
    {
        let connections = Arc::clone(&connections);
        let mut rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(300));
            loop {
                tokio::select! {
                    _ = ticker.tick() => connections.prune_idle(chrono::Duration::hours(1)),
                    _ = rx.recv() => return,
                }
            }
        });
    }
    tracing::info!("Protection workers started");

    // 7. Shutdown on ctrl-c / SIGTERM
    {
        let shutdown_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received, draining");
            let _ = shutdown_tx.send(());
        });
    }

    // 8. Serve all EA channels until shutdown
    ea_server::serve_all(state, config.ports, shutdown_tx).await?;

    store.pool().close().await;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sig) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            sig.recv().await;
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
