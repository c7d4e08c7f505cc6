use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use command_queue::CommandQueue;
use serde_json::json;
use signal_engine::SignalEngine;
use storage::{decision, Store};
use tokio::sync::broadcast;
use trading_core::{
    AssetClass, CloseReason, CommandPriority, CommandType, DecisionImpact, SignalType, Timeframe,
    TimeoutAction, TradeDirection,
};

use crate::breaker::CircuitBreaker;
use crate::pause::SymbolPauseRegistry;

/// SL hits inside this window trigger a symbol cooldown.
const SL_HIT_WINDOW_HOURS: i64 = 4;
const SL_HIT_LIMIT: i64 = 2;

/// Sample size before a symbol can be auto-disabled on win rate.
const PERFORMANCE_MIN_SAMPLE: i64 = 5;
const PERFORMANCE_DISABLE_WIN_RATE: f64 = 30.0;

/// Recompute daily profit, drive the loss circuit breakers, and emergency-
/// close everything when the drawdown turns critical. Runs every minute.
pub async fn run_drawdown_worker(
    store: Store,
    queue: Arc<CommandQueue>,
    breaker: Arc<CircuitBreaker>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(60));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = drawdown_pass(&store, &queue, &breaker).await {
                    tracing::warn!("Drawdown worker pass failed: {}", e);
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Drawdown worker shutting down");
                return;
            }
        }
    }
}

pub(crate) async fn drawdown_pass(
    store: &Store,
    queue: &CommandQueue,
    breaker: &CircuitBreaker,
) -> Result<()> {
    let settings = store.load_settings().await?;
    for mut account in store.list_accounts().await? {
        let profit_today = store.compute_profit_today(account.id).await?;
        store.set_profit_today(account.id, profit_today).await?;
        account.profit_today = profit_today;

        if let Some(reason) = breaker.check(&account, &settings).await? {
            tracing::warn!("Account {} trading blocked: {}", account.id, reason);
        }

        // Critical drawdown: 1.5x the daily breaker limit force-closes all
        // open positions.
        if account.balance > 0.0 {
            let daily_pct = profit_today / account.balance * 100.0;
            if daily_pct <= -(settings.max_daily_loss_percent * 1.5) {
                let open = store.list_open_trades(account.id).await?;
                if !open.is_empty() {
                    tracing::error!(
                        "Account {} critical drawdown {:.1}%: emergency-closing {} trades",
                        account.id,
                        daily_pct.abs(),
                        open.len()
                    );
                    for trade in &open {
                        queue
                            .enqueue(
                                account.id,
                                CommandType::CloseTrade,
                                json!({
                                    "ticket": trade.ticket,
                                    "reason": CloseReason::EmergencyClose.as_str(),
                                }),
                                CommandPriority::Critical,
                                None,
                            )
                            .await?;
                    }
                    store
                        .record_decision(&decision(
                            account.id,
                            "EMERGENCY_CLOSE",
                            None,
                            false,
                            &format!(
                                "Critical daily drawdown {:.1}%, closed {} positions",
                                daily_pct.abs(),
                                open.len()
                            ),
                            DecisionImpact::Critical,
                        ))
                        .await?;
                }
            }
        }
    }
    Ok(())
}

/// Event hook: called when a trade closes by stop loss. Two hits on one
/// symbol within the window pause it for the configured cooldown.
pub async fn note_sl_hit(
    store: &Store,
    pauses: &SymbolPauseRegistry,
    symbol: &str,
    account_id: i64,
) -> Result<()> {
    let hits = store.count_recent_sl_hits(symbol, SL_HIT_WINDOW_HOURS).await?;
    if hits < SL_HIT_LIMIT || pauses.is_paused(symbol) {
        return Ok(());
    }

    let settings = store.load_settings().await?;
    pauses.pause(symbol, settings.sl_cooldown_minutes);
    store
        .record_decision(&decision(
            account_id,
            "RISK_LIMIT",
            Some(symbol),
            false,
            &format!(
                "{} SL hits within {}h, paused for {} minutes",
                hits, SL_HIT_WINDOW_HOURS, settings.sl_cooldown_minutes
            ),
            DecisionImpact::High,
        ))
        .await?;
    Ok(())
}

/// Periodic sweep backing up the event hook, so hits reported while the
/// server was down still produce a cooldown.
pub async fn run_sl_hit_worker(
    store: Store,
    pauses: Arc<SymbolPauseRegistry>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(120));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let symbols: Vec<String> = match store.list_all_open_trades().await {
                    Ok(trades) => {
                        let mut s: Vec<String> = trades.into_iter().map(|t| t.symbol).collect();
                        s.sort();
                        s.dedup();
                        s
                    }
                    Err(e) => {
                        tracing::warn!("SL-hit worker could not list trades: {}", e);
                        continue;
                    }
                };
                for symbol in symbols {
                    if let Err(e) = note_sl_hit(&store, &pauses, &symbol, 0).await {
                        tracing::warn!("SL-hit check for {} failed: {}", symbol, e);
                    }
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("SL-hit worker shutting down");
                return;
            }
        }
    }
}

/// Close, alert on, or ignore trades that have been open too long.
/// Runs every five minutes.
pub async fn run_timeout_worker(
    store: Store,
    queue: Arc<CommandQueue>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(300));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = timeout_pass(&store, &queue).await {
                    tracing::warn!("Trade timeout pass failed: {}", e);
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Trade timeout worker shutting down");
                return;
            }
        }
    }
}

async fn timeout_pass(store: &Store, queue: &CommandQueue) -> Result<()> {
    let settings = store.load_settings().await?;
    let cutoff = Utc::now() - chrono::Duration::hours(settings.trade_timeout_hours);

    for trade in store.list_all_open_trades().await? {
        if trade.open_time > cutoff {
            continue;
        }
        let age_hours = (Utc::now() - trade.open_time).num_hours();

        match settings.trade_timeout_action {
            TimeoutAction::Ignore => {}
            TimeoutAction::Alert => {
                tracing::warn!(
                    "Trade #{} {} open for {}h (limit {}h)",
                    trade.ticket,
                    trade.symbol,
                    age_hours,
                    settings.trade_timeout_hours
                );
                store
                    .record_decision(&decision(
                        trade.account_id,
                        "TRADE_TIMEOUT",
                        Some(&trade.symbol),
                        true,
                        &format!("Trade #{} exceeded {}h, alert only", trade.ticket, age_hours),
                        DecisionImpact::Medium,
                    ))
                    .await?;
            }
            TimeoutAction::Close => {
                tracing::info!(
                    "Trade #{} {} open {}h, issuing TIME_EXIT",
                    trade.ticket,
                    trade.symbol,
                    age_hours
                );
                queue
                    .enqueue(
                        trade.account_id,
                        CommandType::CloseTrade,
                        json!({
                            "ticket": trade.ticket,
                            "reason": CloseReason::TimeExit.as_str(),
                        }),
                        CommandPriority::High,
                        None,
                    )
                    .await?;
                store
                    .record_decision(&decision(
                        trade.account_id,
                        "TRADE_TIMEOUT",
                        Some(&trade.symbol),
                        false,
                        &format!("Trade #{} exceeded {}h, closing", trade.ticket, age_hours),
                        DecisionImpact::Medium,
                    ))
                    .await?;
            }
        }
    }
    Ok(())
}

/// Re-run the signal pipeline against losing open trades; close the ones
/// whose entry thesis no longer holds. Winners are never touched.
pub async fn run_strategy_validation_worker(
    store: Store,
    queue: Arc<CommandQueue>,
    engine: Arc<SignalEngine>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(300));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = validation_pass(&store, &queue, &engine).await {
                    tracing::warn!("Strategy validation pass failed: {}", e);
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Strategy validation worker shutting down");
                return;
            }
        }
    }
}

async fn validation_pass(
    store: &Store,
    queue: &CommandQueue,
    engine: &SignalEngine,
) -> Result<()> {
    for trade in store.list_all_open_trades().await? {
        let tick = match store.latest_tick(&trade.symbol).await? {
            Some(t) => t,
            None => continue,
        };
        let price = match trade.direction {
            TradeDirection::Buy => tick.bid,
            TradeDirection::Sell => tick.ask,
        };

        // Only losing trades are candidates.
        if (price - trade.open_price) * trade.direction.sign() >= 0.0 {
            continue;
        }

        let timeframe = match trade.signal_id {
            Some(signal_id) => store
                .get_signal(signal_id)
                .await?
                .map(|s| s.timeframe)
                .unwrap_or(Timeframe::H1),
            None => Timeframe::H1,
        };
        let entry_confidence = match trade.signal_id {
            Some(signal_id) => store.get_signal(signal_id).await?.map(|s| s.confidence),
            None => None,
        };

        // No current evaluation means no evidence either way; skip.
        let raw = match engine.evaluate_raw(&trade.symbol, timeframe).await? {
            Some(r) => r,
            None => continue,
        };

        let entry_direction = match trade.direction {
            TradeDirection::Buy => SignalType::Buy,
            TradeDirection::Sell => SignalType::Sell,
        };

        let flipped = raw.signal_type != entry_direction;
        let confidence_collapsed = matches!(
            entry_confidence,
            Some(entry) if !flipped && entry - raw.confidence >= 20.0
        );
        let pattern_gone = !flipped && !raw.has_entry_pattern && entry_confidence.is_some();

        let why = if flipped {
            format!("direction flipped to {}", raw.signal_type.as_str())
        } else if confidence_collapsed {
            format!(
                "confidence fell {:.0} -> {:.0}",
                entry_confidence.unwrap_or(0.0),
                raw.confidence
            )
        } else if pattern_gone {
            "entry pattern no longer present".to_string()
        } else {
            continue;
        };

        tracing::info!(
            "Strategy invalid for #{} {}: {}",
            trade.ticket,
            trade.symbol,
            why
        );
        queue
            .enqueue(
                trade.account_id,
                CommandType::CloseTrade,
                json!({
                    "ticket": trade.ticket,
                    "reason": CloseReason::StrategyInvalid.as_str(),
                }),
                CommandPriority::High,
                None,
            )
            .await?;
        store
            .record_decision(&decision(
                trade.account_id,
                "STRATEGY_INVALID",
                Some(&trade.symbol),
                false,
                &format!("Trade #{}: {}", trade.ticket, why),
                DecisionImpact::High,
            ))
            .await?;
    }
    Ok(())
}

/// Refresh the currency pause set from the economic calendar store.
/// High-impact events pause their currency from T-15m to T+5m.
pub async fn run_news_pause_worker(
    store: Store,
    currency_pauses: Arc<SymbolPauseRegistry>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(60));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match store.currencies_in_news_pause(15, 5).await {
                    Ok(currencies) => {
                        for currency in currencies {
                            if !currency_pauses.is_paused(&currency) {
                                tracing::info!("News pause for {}", currency);
                                // Refreshed every pass while the event window lasts
                                currency_pauses.pause(&currency, 2);
                            }
                        }
                    }
                    Err(e) => tracing::warn!("News pause query failed: {}", e),
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("News pause worker shutting down");
                return;
            }
        }
    }
}

/// Whether a symbol touches any currency currently in a news pause.
pub fn symbol_in_news_pause(currency_pauses: &SymbolPauseRegistry, symbol: &str) -> bool {
    AssetClass::currencies_of(symbol)
        .iter()
        .any(|c| currency_pauses.is_paused(c))
}

/// Bounded retention: old decision-log rows and expired ticks.
/// Runs hourly.
pub async fn run_retention_worker(store: Store, mut shutdown: broadcast::Receiver<()>) {
    let mut ticker = tokio::time::interval(Duration::from_secs(3600));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match store.prune_decisions(30).await {
                    Ok(n) if n > 0 => tracing::info!("Pruned {} old decisions", n),
                    Ok(_) => {}
                    Err(e) => tracing::warn!("Decision pruning failed: {}", e),
                }
                match store.prune_ticks(7).await {
                    Ok(n) if n > 0 => tracing::info!("Pruned {} old ticks", n),
                    Ok(_) => {}
                    Err(e) => tracing::warn!("Tick pruning failed: {}", e),
                }
                match store.expire_stale_signals(
                    store.load_settings().await.map(|s| s.signal_max_age_minutes).unwrap_or(60),
                ).await {
                    Ok(n) if n > 0 => tracing::info!("Expired {} stale signals", n),
                    Ok(_) => {}
                    Err(e) => tracing::warn!("Signal expiry failed: {}", e),
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Retention worker shutting down");
                return;
            }
        }
    }
}

/// Event hook: refresh a symbol's rolling performance after a close;
/// disables the symbol when its 24h win rate collapses.
pub async fn refresh_symbol_performance(store: &Store, symbol: &str) -> Result<()> {
    let (wins, total, profit) = store.symbol_rolling_stats(symbol).await?;
    let win_rate = if total > 0 {
        wins as f64 / total as f64 * 100.0
    } else {
        0.0
    };
    let disabled = store
        .update_symbol_performance(
            symbol,
            win_rate,
            profit,
            total,
            PERFORMANCE_DISABLE_WIN_RATE,
            PERFORMANCE_MIN_SAMPLE,
        )
        .await?;
    if disabled {
        tracing::warn!(
            "Symbol {} auto-disabled: win rate {:.1}% over {} trades",
            symbol,
            win_rate,
            total
        );
    }
    Ok(())
}
