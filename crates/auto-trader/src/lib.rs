mod correlation;
mod sizing;

#[cfg(test)]
#[path = "tests.rs"]
mod trader_tests;

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use command_queue::CommandQueue;
use market_data::{SpreadStats, TickBuffer};
use risk_manager::{symbol_in_news_pause, CircuitBreaker, SymbolPauseRegistry};
use serde_json::json;
use storage::{decision, Store};
use trading_core::{
    AssetClass, BrokerSymbolInfo, CommandPriority, CommandType, DecisionImpact, Signal,
    SignalStatus, SignalType,
};

pub use correlation::correlated_exposure;
pub use sizing::position_size;

/// Seconds after which the latest tick is considered stale.
const MAX_TICK_AGE_SECONDS: i64 = 60;

/// How the EA connection layer reports account health to the gate.
pub trait EaHealth: Send + Sync {
    fn ea_is_healthy(&self, account_id: i64) -> bool;
}

/// Outcome of one gating run.
#[derive(Debug, Clone, PartialEq)]
pub enum GateOutcome {
    /// OPEN_TRADE emitted with this command id.
    Executed(uuid::Uuid),
    /// Rejected at a gate; the reason was written to the decision log.
    Rejected(String),
}

/// Turns fresh signals into OPEN_TRADE commands under the global and
/// per-symbol guardrails. Every rejection is logged with its exact reason;
/// the first failing gate short-circuits.
pub struct AutoTrader {
    store: Store,
    queue: Arc<CommandQueue>,
    breaker: Arc<CircuitBreaker>,
    sl_pauses: Arc<SymbolPauseRegistry>,
    currency_pauses: Arc<SymbolPauseRegistry>,
    spreads: Arc<SpreadStats>,
    ticks: Arc<TickBuffer>,
    health: Arc<dyn EaHealth>,
}

impl AutoTrader {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Store,
        queue: Arc<CommandQueue>,
        breaker: Arc<CircuitBreaker>,
        sl_pauses: Arc<SymbolPauseRegistry>,
        currency_pauses: Arc<SymbolPauseRegistry>,
        spreads: Arc<SpreadStats>,
        ticks: Arc<TickBuffer>,
        health: Arc<dyn EaHealth>,
    ) -> Self {
        Self {
            store,
            queue,
            breaker,
            sl_pauses,
            currency_pauses,
            spreads,
            ticks,
            health,
        }
    }

    /// Evaluate a signal against the full gate stack and execute it if
    /// everything passes.
    pub async fn execute_signal(&self, signal: &Signal) -> Result<GateOutcome> {
        let settings = self.store.load_settings().await?;

        if !settings.autotrade_enabled {
            return self.reject(signal, "Auto-trading disabled", DecisionImpact::Low).await;
        }

        let account = match self.store.get_account(signal.account_id).await? {
            Some(a) => a,
            None => {
                return self
                    .reject(signal, "Account not found", DecisionImpact::Medium)
                    .await
            }
        };

        // 1. Circuit breaker
        if let Some(reason) = self.breaker.check(&account, &settings).await? {
            return self
                .reject(signal, &format!("Circuit breaker tripped: {}", reason), DecisionImpact::High)
                .await;
        }

        // 2. EA connection health
        if !self.health.ea_is_healthy(signal.account_id) {
            return self
                .reject(signal, "EA connection unhealthy", DecisionImpact::Medium)
                .await;
        }

        // 3. Signal age
        let age = signal.age_minutes(Utc::now());
        if age > settings.signal_max_age_minutes {
            self.store.set_signal_status(signal.id, SignalStatus::Expired).await?;
            return self
                .reject(
                    signal,
                    &format!("Signal {}min old exceeds {}min", age, settings.signal_max_age_minutes),
                    DecisionImpact::Low,
                )
                .await;
        }

        // 4. Symbol cooldowns: SL-hit pause, news pause, auto-disable
        if self.sl_pauses.is_paused(&signal.symbol) {
            return self
                .reject(signal, "Symbol in SL-hit cooldown", DecisionImpact::Medium)
                .await;
        }
        if symbol_in_news_pause(&self.currency_pauses, &signal.symbol) {
            return self
                .reject(signal, "Symbol currency in news pause", DecisionImpact::Medium)
                .await;
        }
        if self.store.is_symbol_disabled(&signal.symbol).await? {
            return self
                .reject(signal, "Symbol auto-disabled on performance", DecisionImpact::Medium)
                .await;
        }

        // 5. Global position cap
        let open_total = self.store.count_open_trades(signal.account_id).await?;
        if open_total >= settings.max_positions as i64 {
            return self
                .reject(
                    signal,
                    &format!("Max open positions reached ({})", settings.max_positions),
                    DecisionImpact::Low,
                )
                .await;
        }

        // 6. Per-symbol cap
        let open_symbol = self
            .store
            .count_open_trades_for_symbol(signal.account_id, &signal.symbol)
            .await?;
        if open_symbol >= settings.max_positions_per_symbol as i64 {
            return self
                .reject(
                    signal,
                    &format!(
                        "Max positions for {} reached ({})",
                        signal.symbol, settings.max_positions_per_symbol
                    ),
                    DecisionImpact::Low,
                )
                .await;
        }

        // 7. Correlation exposure
        let direction = match signal.signal_type {
            SignalType::Buy => trading_core::TradeDirection::Buy,
            SignalType::Sell => trading_core::TradeDirection::Sell,
            _ => {
                return self
                    .reject(signal, "Signal is not directional", DecisionImpact::Low)
                    .await
            }
        };
        let open_trades = self.store.list_open_trades(signal.account_id).await?;
        let correlated = correlated_exposure(&open_trades, &signal.symbol, direction);
        if correlated >= 2 {
            return self
                .reject(
                    signal,
                    &format!("{} correlated positions already in this direction", correlated),
                    DecisionImpact::Medium,
                )
                .await;
        }

        // 8. Daily drawdown
        if account.balance > 0.0 {
            let daily_pct = account.profit_today / account.balance * 100.0;
            if daily_pct <= -settings.max_daily_loss_percent {
                return self
                    .reject(
                        signal,
                        &format!("Daily drawdown {:.1}% at limit", daily_pct.abs()),
                        DecisionImpact::High,
                    )
                    .await;
            }
        }

        // 9. Confidence floor (per-symbol override wins)
        let min_confidence = self
            .store
            .get_symbol_override(&signal.symbol)
            .await?
            .and_then(|o| o.min_confidence)
            .unwrap_or(settings.min_autotrade_confidence);
        if signal.confidence < min_confidence {
            return self
                .reject(
                    signal,
                    &format!("Confidence {:.1}% below {:.1}%", signal.confidence, min_confidence),
                    DecisionImpact::Low,
                )
                .await;
        }

        // 10/11. Spread and tick freshness
        let tick = match self.ticks.latest(&signal.symbol) {
            Some(t) => t,
            None => {
                return self
                    .reject(signal, "No tick data for symbol", DecisionImpact::Medium)
                    .await
            }
        };
        let tick_age = (Utc::now() - tick.timestamp).num_seconds();
        if tick_age > MAX_TICK_AGE_SECONDS {
            return self
                .reject(
                    signal,
                    &format!("Latest tick {}s old exceeds {}s", tick_age, MAX_TICK_AGE_SECONDS),
                    DecisionImpact::Medium,
                )
                .await;
        }

        let class_cap = AssetClass::classify(&signal.symbol).profile().max_spread;
        if tick.spread > class_cap {
            return self
                .reject(
                    signal,
                    &format!("Spread {:.5} over class cap {:.5}", tick.spread, class_cap),
                    DecisionImpact::Medium,
                )
                .await;
        }
        if let Some(avg) = self.spreads.average(&signal.symbol) {
            if avg > 0.0 && tick.spread > avg * 3.0 {
                return self
                    .reject(
                        signal,
                        &format!("Spread {:.5} over 3x rolling average {:.5}", tick.spread, avg),
                        DecisionImpact::Medium,
                    )
                    .await;
            }
        }

        // 12. Position sizing
        let sl = match signal.sl_price {
            Some(sl) => sl,
            None => {
                return self
                    .reject(signal, "Signal carries no SL", DecisionImpact::Medium)
                    .await
            }
        };
        let broker = self
            .store
            .get_broker_symbol(signal.account_id, &signal.symbol)
            .await?
            .unwrap_or_else(|| BrokerSymbolInfo::fallback(signal.account_id, &signal.symbol));
        let volume = match position_size(
            account.balance,
            settings.risk_per_trade_percent,
            signal.entry_price,
            sl,
            &broker,
        ) {
            Some(v) => v,
            None => {
                return self
                    .reject(signal, "No valid volume within broker bounds", DecisionImpact::Medium)
                    .await
            }
        };

        // 13. Emit the command
        let command_id = self
            .queue
            .enqueue(
                signal.account_id,
                CommandType::OpenTrade,
                json!({
                    "symbol": signal.symbol,
                    "order_type": direction.as_str(),
                    "volume": volume,
                    "sl": signal.sl_price,
                    "tp": signal.tp_price,
                    "comment": format!(
                        "Auto {} {} @ {:.0}% confidence",
                        direction.as_str(),
                        signal.timeframe.name(),
                        signal.confidence
                    ),
                    "signal_id": signal.id,
                }),
                CommandPriority::Normal,
                Some(signal.id),
            )
            .await?;

        self.store
            .record_decision(&{
                let mut d = decision(
                    signal.account_id,
                    "TRADE_EXECUTION",
                    Some(&signal.symbol),
                    true,
                    &format!(
                        "{} {} {:.2} lots @ {:.1}% confidence",
                        direction.as_str(),
                        signal.symbol,
                        volume,
                        signal.confidence
                    ),
                    DecisionImpact::High,
                );
                d.signal_id = Some(signal.id);
                d
            })
            .await?;

        tracing::info!(
            "Executing signal {}: {} {} {:.2} lots (command {})",
            signal.id,
            direction.as_str(),
            signal.symbol,
            volume,
            command_id
        );
        Ok(GateOutcome::Executed(command_id))
    }

    /// Sweep all active signals for an account through the gate.
    pub async fn run_account(&self, account_id: i64) -> Result<Vec<GateOutcome>> {
        let mut outcomes = Vec::new();
        for signal in self.store.list_active_signals(account_id).await? {
            if signal.signal_type != SignalType::Buy && signal.signal_type != SignalType::Sell {
                continue;
            }
            match self.execute_signal(&signal).await {
                Ok(outcome) => {
                    if let GateOutcome::Executed(_) = outcome {
                        self.store
                            .set_signal_status(signal.id, SignalStatus::Executed)
                            .await?;
                    }
                    outcomes.push(outcome);
                }
                Err(e) => tracing::warn!("Gate run for signal {} failed: {}", signal.id, e),
            }
        }
        Ok(outcomes)
    }

    /// Completion hook for OPEN_TRADE commands, fed from the EA response
    /// path and the timeout sweep.
    pub async fn handle_open_result(
        &self,
        account_id: i64,
        success: bool,
        retriable: bool,
    ) -> Result<()> {
        if success {
            self.breaker.record_successful_open(account_id);
        } else if !retriable {
            self.breaker.record_failed_open(account_id).await?;
        }
        Ok(())
    }

    async fn reject(&self, signal: &Signal, reason: &str, impact: DecisionImpact) -> Result<GateOutcome> {
        tracing::info!(
            "Signal {} ({} {}) rejected: {}",
            signal.id,
            signal.symbol,
            signal.signal_type.as_str(),
            reason
        );
        let mut d = decision(
            signal.account_id,
            "TRADE_EXECUTION",
            Some(&signal.symbol),
            false,
            reason,
            impact,
        );
        d.signal_id = Some(signal.id);
        self.store.record_decision(&d).await?;
        Ok(GateOutcome::Rejected(reason.to_string()))
    }
}
