use anyhow::Result;
use chrono::{Duration, Utc};
use trading_core::{Signal, SignalStatus, SignalType, Timeframe};

use crate::rows::SignalRow;
use crate::Store;

/// What the upsert did with the candidate signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalUpsertOutcome {
    /// No active signal existed; a new row was created.
    Created(i64),
    /// The candidate won (higher confidence or direction change) and
    /// replaced the active row in place.
    Replaced(i64),
    /// The existing signal won; only its updated_at was bumped.
    Kept(i64),
}

impl SignalUpsertOutcome {
    pub fn signal_id(&self) -> i64 {
        match self {
            SignalUpsertOutcome::Created(id)
            | SignalUpsertOutcome::Replaced(id)
            | SignalUpsertOutcome::Kept(id) => *id,
        }
    }
}

impl Store {
    /// Atomic insert-or-replace for the single active signal per
    /// (account, symbol, timeframe). A concurrent generator racing this call
    /// is stopped by the partial unique index; the transaction retries as a
    /// keep/replace against the winner's row.
    pub async fn upsert_signal(
        &self,
        account_id: i64,
        symbol: &str,
        timeframe: Timeframe,
        signal_type: SignalType,
        confidence: f64,
        entry_price: f64,
        sl_price: Option<f64>,
        tp_price: Option<f64>,
        indicator_snapshot: &serde_json::Value,
    ) -> Result<SignalUpsertOutcome> {
        let now = Utc::now().to_rfc3339();
        let snapshot = serde_json::to_string(indicator_snapshot)?;

        let mut tx = self.pool().begin().await?;

        let existing: Option<(i64, f64, String)> = sqlx::query_as(
            "SELECT id, confidence, signal_type FROM signals
             WHERE account_id = ? AND symbol = ? AND timeframe = ? AND status = 'active'",
        )
        .bind(account_id)
        .bind(symbol)
        .bind(timeframe.name())
        .fetch_optional(&mut *tx)
        .await?;

        let outcome = match existing {
            None => {
                let result = sqlx::query(
                    "INSERT INTO signals (account_id, symbol, timeframe, signal_type,
                        confidence, entry_price, sl_price, tp_price, indicator_snapshot,
                        created_at, updated_at, status)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'active')
                     ON CONFLICT(account_id, symbol, timeframe) WHERE status = 'active'
                     DO NOTHING",
                )
                .bind(account_id)
                .bind(symbol)
                .bind(timeframe.name())
                .bind(signal_type.as_str())
                .bind(confidence)
                .bind(entry_price)
                .bind(sl_price)
                .bind(tp_price)
                .bind(&snapshot)
                .bind(&now)
                .bind(&now)
                .execute(&mut *tx)
                .await?;

                if result.rows_affected() == 0 {
                    // Lost a race to a concurrent generator; keep its row.
                    let (id,): (i64,) = sqlx::query_as(
                        "SELECT id FROM signals
                         WHERE account_id = ? AND symbol = ? AND timeframe = ? AND status = 'active'",
                    )
                    .bind(account_id)
                    .bind(symbol)
                    .bind(timeframe.name())
                    .fetch_one(&mut *tx)
                    .await?;
                    SignalUpsertOutcome::Kept(id)
                } else {
                    let (id,): (i64,) = sqlx::query_as("SELECT last_insert_rowid()")
                        .fetch_one(&mut *tx)
                        .await?;
                    SignalUpsertOutcome::Created(id)
                }
            }
            Some((id, old_confidence, old_type)) => {
                let direction_changed = old_type != signal_type.as_str();
                if confidence > old_confidence || direction_changed {
                    sqlx::query(
                        "UPDATE signals SET signal_type = ?, confidence = ?, entry_price = ?,
                            sl_price = ?, tp_price = ?, indicator_snapshot = ?, updated_at = ?
                         WHERE id = ? AND status = 'active'",
                    )
                    .bind(signal_type.as_str())
                    .bind(confidence)
                    .bind(entry_price)
                    .bind(sl_price)
                    .bind(tp_price)
                    .bind(&snapshot)
                    .bind(&now)
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                    SignalUpsertOutcome::Replaced(id)
                } else {
                    sqlx::query("UPDATE signals SET updated_at = ? WHERE id = ?")
                        .bind(&now)
                        .bind(id)
                        .execute(&mut *tx)
                        .await?;
                    SignalUpsertOutcome::Kept(id)
                }
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    pub async fn get_signal(&self, signal_id: i64) -> Result<Option<Signal>> {
        let row: Option<SignalRow> = sqlx::query_as("SELECT * FROM signals WHERE id = ?")
            .bind(signal_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.map(Into::into))
    }

    pub async fn get_active_signal(
        &self,
        account_id: i64,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<Option<Signal>> {
        let row: Option<SignalRow> = sqlx::query_as(
            "SELECT * FROM signals
             WHERE account_id = ? AND symbol = ? AND timeframe = ? AND status = 'active'",
        )
        .bind(account_id)
        .bind(symbol)
        .bind(timeframe.name())
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(Into::into))
    }

    pub async fn list_active_signals(&self, account_id: i64) -> Result<Vec<Signal>> {
        let rows: Vec<SignalRow> = sqlx::query_as(
            "SELECT * FROM signals WHERE account_id = ? AND status = 'active'
             ORDER BY confidence DESC",
        )
        .bind(account_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn set_signal_status(&self, signal_id: i64, status: SignalStatus) -> Result<()> {
        sqlx::query("UPDATE signals SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(Utc::now().to_rfc3339())
            .bind(signal_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Expire active signals older than max_age_minutes. Returns how many
    /// were expired.
    pub async fn expire_stale_signals(&self, max_age_minutes: i64) -> Result<u64> {
        let cutoff = (Utc::now() - Duration::minutes(max_age_minutes)).to_rfc3339();
        let result = sqlx::query(
            "UPDATE signals SET status = 'expired', updated_at = ?
             WHERE status = 'active' AND created_at < ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(cutoff)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected())
    }
}
