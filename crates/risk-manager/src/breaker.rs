use std::sync::Mutex;

use anyhow::Result;
use dashmap::DashMap;
use storage::{decision, Store};
use trading_core::{Account, DecisionImpact, GlobalSettings};

/// Consecutive failed OPEN_TRADE commands that trip the breaker.
const MAX_FAILED_COMMANDS: i32 = 3;

#[derive(Debug, Clone, Default)]
pub struct BreakerState {
    pub tripped: bool,
    pub reason: Option<String>,
    pub failed_command_count: i32,
}

/// Per-account circuit breaker. The cell is in-memory and mutex-guarded;
/// every trip and reset writes an ai_decisions audit row so a restart can
/// reconstruct what happened from storage.
pub struct CircuitBreaker {
    store: Store,
    cells: DashMap<i64, Mutex<BreakerState>>,
}

impl CircuitBreaker {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            cells: DashMap::new(),
        }
    }

    pub fn state(&self, account_id: i64) -> BreakerState {
        self.cells
            .get(&account_id)
            .map(|cell| cell.lock().expect("breaker cell poisoned").clone())
            .unwrap_or_default()
    }

    /// Gate check run at the top of every auto-trader evaluation. Evaluates
    /// the loss thresholds fresh and returns the blocking reason when the
    /// breaker is (or just became) tripped.
    pub async fn check(&self, account: &Account, settings: &GlobalSettings) -> Result<Option<String>> {
        let existing = self.state(account.id);
        if existing.tripped {
            return Ok(existing.reason.or_else(|| Some("Circuit breaker tripped".into())));
        }

        // Daily loss limit
        if account.balance > 0.0 {
            let daily_pct = account.profit_today / account.balance * 100.0;
            if daily_pct <= -settings.max_daily_loss_percent {
                let reason = format!(
                    "Daily loss {:.1}% breached limit {:.1}%",
                    daily_pct.abs(),
                    settings.max_daily_loss_percent
                );
                self.trip(account.id, &reason).await?;
                return Ok(Some(reason));
            }
        }

        // Total drawdown limit
        if account.initial_balance > 0.0 {
            let drawdown_pct =
                (account.initial_balance - account.balance) / account.initial_balance * 100.0;
            if drawdown_pct >= settings.max_total_drawdown_percent {
                let reason = format!(
                    "Total drawdown {:.1}% breached limit {:.1}%",
                    drawdown_pct,
                    settings.max_total_drawdown_percent
                );
                self.trip(account.id, &reason).await?;
                return Ok(Some(reason));
            }
        }

        Ok(None)
    }

    /// Count a permanently failed OPEN_TRADE; trips at the threshold.
    pub async fn record_failed_open(&self, account_id: i64) -> Result<()> {
        let should_trip = {
            let cell = self.cells.entry(account_id).or_default();
            let mut state = cell.lock().expect("breaker cell poisoned");
            state.failed_command_count += 1;
            !state.tripped && state.failed_command_count >= MAX_FAILED_COMMANDS
        };

        if should_trip {
            let count = self.state(account_id).failed_command_count;
            self.trip(
                account_id,
                &format!("{} consecutive failed OPEN_TRADE commands", count),
            )
            .await?;
        }
        Ok(())
    }

    /// A successful OPEN_TRADE clears the consecutive-failure streak.
    pub fn record_successful_open(&self, account_id: i64) {
        if let Some(cell) = self.cells.get(&account_id) {
            cell.lock().expect("breaker cell poisoned").failed_command_count = 0;
        }
    }

    pub async fn trip(&self, account_id: i64, reason: &str) -> Result<()> {
        {
            let cell = self.cells.entry(account_id).or_default();
            let mut state = cell.lock().expect("breaker cell poisoned");
            if state.tripped {
                return Ok(());
            }
            state.tripped = true;
            state.reason = Some(reason.to_string());
        }

        tracing::error!("Circuit breaker TRIPPED for account {}: {}", account_id, reason);
        self.store
            .record_decision(&decision(
                account_id,
                "CIRCUIT_BREAKER",
                None,
                false,
                reason,
                DecisionImpact::Critical,
            ))
            .await?;
        Ok(())
    }

    /// Manual reset via the admin surface; also clears the failure streak.
    pub async fn reset(&self, account_id: i64) -> Result<()> {
        {
            let cell = self.cells.entry(account_id).or_default();
            let mut state = cell.lock().expect("breaker cell poisoned");
            state.tripped = false;
            state.reason = None;
            state.failed_command_count = 0;
        }

        tracing::info!("Circuit breaker reset for account {}", account_id);
        self.store
            .record_decision(&decision(
                account_id,
                "CIRCUIT_BREAKER",
                None,
                true,
                "Manual reset",
                DecisionImpact::High,
            ))
            .await?;
        Ok(())
    }
}
