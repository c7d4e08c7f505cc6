use anyhow::Result;
use chrono::Utc;
use trading_core::Account;

use crate::rows::AccountRow;
use crate::Store;

impl Store {
    /// Load an account by broker identity, creating it on first connect.
    /// The first reported balance is captured as initial_balance.
    pub async fn get_or_create_account(
        &self,
        broker_account_number: i64,
        broker_name: &str,
        currency: &str,
        balance: f64,
    ) -> Result<Account> {
        let existing: Option<AccountRow> = sqlx::query_as(
            "SELECT * FROM accounts WHERE broker_account_number = ? AND broker_name = ?",
        )
        .bind(broker_account_number)
        .bind(broker_name)
        .fetch_optional(self.pool())
        .await?;

        if let Some(row) = existing {
            return Ok(row.into());
        }

        sqlx::query(
            "INSERT INTO accounts (broker_account_number, broker_name, currency,
                balance, equity, initial_balance, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(broker_account_number)
        .bind(broker_name)
        .bind(currency)
        .bind(balance)
        .bind(balance)
        .bind(balance)
        .bind(Utc::now().to_rfc3339())
        .execute(self.pool())
        .await?;

        let row: AccountRow = sqlx::query_as(
            "SELECT * FROM accounts WHERE broker_account_number = ? AND broker_name = ?",
        )
        .bind(broker_account_number)
        .bind(broker_name)
        .fetch_one(self.pool())
        .await?;

        tracing::info!(
            "Created account {} for {}#{}",
            row.id,
            broker_name,
            broker_account_number
        );
        Ok(row.into())
    }

    pub async fn get_account(&self, account_id: i64) -> Result<Option<Account>> {
        let row: Option<AccountRow> = sqlx::query_as("SELECT * FROM accounts WHERE id = ?")
            .bind(account_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.map(Into::into))
    }

    pub async fn list_accounts(&self) -> Result<Vec<Account>> {
        let rows: Vec<AccountRow> = sqlx::query_as("SELECT * FROM accounts ORDER BY id")
            .fetch_all(self.pool())
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Refresh account state from a heartbeat payload.
    pub async fn update_account_state(
        &self,
        account_id: i64,
        balance: f64,
        equity: f64,
        margin: f64,
        free_margin: f64,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE accounts SET balance = ?, equity = ?, margin = ?, free_margin = ?
             WHERE id = ?",
        )
        .bind(balance)
        .bind(equity)
        .bind(margin)
        .bind(free_margin)
        .bind(account_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn set_profit_today(&self, account_id: i64, profit_today: f64) -> Result<()> {
        sqlx::query("UPDATE accounts SET profit_today = ? WHERE id = ?")
            .bind(profit_today)
            .bind(account_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Sum of profit across trades closed since the account-local midnight.
    /// The account clock is treated as UTC.
    pub async fn compute_profit_today(&self, account_id: i64) -> Result<f64> {
        let midnight = Utc::now()
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|t| t.and_utc().to_rfc3339())
            .unwrap_or_else(|| Utc::now().to_rfc3339());

        let row: Option<(Option<f64>,)> = sqlx::query_as(
            "SELECT SUM(COALESCE(profit, 0) + COALESCE(commission, 0) + COALESCE(swap, 0))
             FROM trades
             WHERE account_id = ? AND status = 'closed' AND close_time >= ?",
        )
        .bind(account_id)
        .bind(&midnight)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.and_then(|(v,)| v).unwrap_or(0.0))
    }
}
