use anyhow::Result;
use chrono::{Duration, Utc};
use trading_core::{AiDecision, BrokerSymbolInfo, DecisionImpact, GlobalSettings};

use crate::Store;

/// Nullable per-symbol tuning merged over the asset-class profile.
#[derive(Debug, Clone, Default, sqlx::FromRow)]
pub struct SymbolOverride {
    pub symbol: String,
    pub tp_atr_mult: Option<f64>,
    pub sl_atr_mult: Option<f64>,
    pub trailing_mult: Option<f64>,
    pub min_confidence: Option<f64>,
}

impl Store {
    /// Load settings, falling back to compiled-in defaults when the row is
    /// missing or unreadable.
    pub async fn load_settings(&self) -> Result<GlobalSettings> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM global_settings WHERE key = 'settings'")
                .fetch_optional(self.pool())
                .await?;

        Ok(row
            .and_then(|(json,)| serde_json::from_str(&json).ok())
            .unwrap_or_default())
    }

    pub async fn save_settings(&self, settings: &GlobalSettings) -> Result<()> {
        sqlx::query(
            "INSERT INTO global_settings (key, value, updated_at) VALUES ('settings', ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(serde_json::to_string(settings)?)
        .bind(Utc::now().to_rfc3339())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn upsert_broker_symbol(&self, info: &BrokerSymbolInfo) -> Result<()> {
        sqlx::query(
            "INSERT INTO broker_symbols (account_id, symbol, digits, point_value, stops_level,
                freeze_level, volume_min, volume_max, volume_step)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(account_id, symbol) DO UPDATE SET
                digits = excluded.digits, point_value = excluded.point_value,
                stops_level = excluded.stops_level, freeze_level = excluded.freeze_level,
                volume_min = excluded.volume_min, volume_max = excluded.volume_max,
                volume_step = excluded.volume_step",
        )
        .bind(info.account_id)
        .bind(&info.symbol)
        .bind(info.digits)
        .bind(info.point_value)
        .bind(info.stops_level)
        .bind(info.freeze_level)
        .bind(info.volume_min)
        .bind(info.volume_max)
        .bind(info.volume_step)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn get_broker_symbol(
        &self,
        account_id: i64,
        symbol: &str,
    ) -> Result<Option<BrokerSymbolInfo>> {
        let row: Option<(i64, String, i32, f64, i32, i32, f64, f64, f64)> = sqlx::query_as(
            "SELECT account_id, symbol, digits, point_value, stops_level, freeze_level,
                volume_min, volume_max, volume_step
             FROM broker_symbols WHERE account_id = ? AND symbol = ?",
        )
        .bind(account_id)
        .bind(symbol)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(
            |(account_id, symbol, digits, point_value, stops_level, freeze_level, vmin, vmax, vstep)| {
                BrokerSymbolInfo {
                    account_id,
                    symbol,
                    digits,
                    point_value,
                    stops_level,
                    freeze_level,
                    volume_min: vmin,
                    volume_max: vmax,
                    volume_step: vstep,
                }
            },
        ))
    }

    pub async fn get_symbol_override(&self, symbol: &str) -> Result<Option<SymbolOverride>> {
        let row: Option<SymbolOverride> =
            sqlx::query_as("SELECT * FROM symbol_overrides WHERE symbol = ?")
                .bind(symbol)
                .fetch_optional(self.pool())
                .await?;
        Ok(row)
    }

    pub async fn upsert_symbol_override(&self, ov: &SymbolOverride) -> Result<()> {
        sqlx::query(
            "INSERT INTO symbol_overrides (symbol, tp_atr_mult, sl_atr_mult, trailing_mult, min_confidence)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(symbol) DO UPDATE SET
                tp_atr_mult = excluded.tp_atr_mult, sl_atr_mult = excluded.sl_atr_mult,
                trailing_mult = excluded.trailing_mult, min_confidence = excluded.min_confidence",
        )
        .bind(&ov.symbol)
        .bind(ov.tp_atr_mult)
        .bind(ov.sl_atr_mult)
        .bind(ov.trailing_mult)
        .bind(ov.min_confidence)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Append a gating decision. Every rejected signal, skipped execution
    /// and breaker trip lands here; silent failures are forbidden.
    pub async fn record_decision(&self, decision: &AiDecision) -> Result<()> {
        sqlx::query(
            "INSERT INTO ai_decisions (timestamp, decision_type, account_id, symbol, signal_id,
                approved, reason, details, impact, action_required)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(decision.timestamp.to_rfc3339())
        .bind(&decision.decision_type)
        .bind(decision.account_id)
        .bind(&decision.symbol)
        .bind(decision.signal_id)
        .bind(decision.approved)
        .bind(&decision.reason)
        .bind(serde_json::to_string(&decision.details)?)
        .bind(decision.impact.as_str())
        .bind(decision.action_required)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn count_decisions(&self, account_id: i64, decision_type: &str) -> Result<i64> {
        let (n,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM ai_decisions WHERE account_id = ? AND decision_type = ?",
        )
        .bind(account_id)
        .bind(decision_type)
        .fetch_one(self.pool())
        .await?;
        Ok(n)
    }

    /// Bounded retention for the decision log.
    pub async fn prune_decisions(&self, retention_days: i64) -> Result<u64> {
        let cutoff = (Utc::now() - Duration::days(retention_days)).to_rfc3339();
        let result = sqlx::query("DELETE FROM ai_decisions WHERE timestamp < ?")
            .bind(cutoff)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }

    /// Refresh a symbol's rolling performance; auto-disable when the win
    /// rate falls below `disable_threshold` with enough samples.
    pub async fn update_symbol_performance(
        &self,
        symbol: &str,
        win_rate: f64,
        profit: f64,
        sample: i64,
        disable_threshold: f64,
        min_sample: i64,
    ) -> Result<bool> {
        let disabled = sample >= min_sample && win_rate < disable_threshold;
        let reason = disabled.then(|| {
            format!(
                "24h win rate {:.1}% below {:.0}% over {} trades",
                win_rate, disable_threshold, sample
            )
        });

        sqlx::query(
            "INSERT INTO symbol_performance_tracking
                (symbol, status, auto_disabled_reason, win_rate_24h, profit_24h, sample_24h, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(symbol) DO UPDATE SET
                status = excluded.status,
                auto_disabled_reason = excluded.auto_disabled_reason,
                win_rate_24h = excluded.win_rate_24h,
                profit_24h = excluded.profit_24h,
                sample_24h = excluded.sample_24h,
                updated_at = excluded.updated_at",
        )
        .bind(symbol)
        .bind(if disabled { "disabled" } else { "active" })
        .bind(&reason)
        .bind(win_rate)
        .bind(profit)
        .bind(sample)
        .bind(Utc::now().to_rfc3339())
        .execute(self.pool())
        .await?;

        Ok(disabled)
    }

    pub async fn is_symbol_disabled(&self, symbol: &str) -> Result<bool> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT status FROM symbol_performance_tracking WHERE symbol = ?",
        )
        .bind(symbol)
        .fetch_optional(self.pool())
        .await?;
        Ok(matches!(row, Some((s,)) if s == "disabled"))
    }

    pub async fn set_symbol_status(&self, symbol: &str, status: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO symbol_performance_tracking (symbol, status, updated_at)
             VALUES (?, ?, ?)
             ON CONFLICT(symbol) DO UPDATE SET
                status = excluded.status, updated_at = excluded.updated_at",
        )
        .bind(symbol)
        .bind(status)
        .bind(Utc::now().to_rfc3339())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Currencies with a high-impact event inside the pause window
    /// (T - pre_minutes .. T + post_minutes).
    pub async fn currencies_in_news_pause(
        &self,
        pre_minutes: i64,
        post_minutes: i64,
    ) -> Result<Vec<String>> {
        let now = Utc::now();
        let window_start = (now - Duration::minutes(post_minutes)).to_rfc3339();
        let window_end = (now + Duration::minutes(pre_minutes)).to_rfc3339();

        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT currency FROM news_events
             WHERE impact = 'high' AND event_time BETWEEN ? AND ?",
        )
        .bind(window_start)
        .bind(window_end)
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(|(c,)| c).collect())
    }

    pub async fn insert_news_event(
        &self,
        currency: &str,
        impact: &str,
        event_time: chrono::DateTime<Utc>,
        title: &str,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO news_events (currency, impact, event_time, title) VALUES (?, ?, ?, ?)",
        )
        .bind(currency)
        .bind(impact)
        .bind(event_time.to_rfc3339())
        .bind(title)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}

/// Helper to build a decision row with less ceremony at call sites.
pub fn decision(
    account_id: i64,
    decision_type: &str,
    symbol: Option<&str>,
    approved: bool,
    reason: &str,
    impact: DecisionImpact,
) -> AiDecision {
    AiDecision {
        timestamp: Utc::now(),
        decision_type: decision_type.to_string(),
        account_id,
        symbol: symbol.map(|s| s.to_string()),
        signal_id: None,
        approved,
        reason: reason.to_string(),
        details: serde_json::Value::Null,
        impact,
        action_required: matches!(impact, DecisionImpact::Critical),
    }
}
