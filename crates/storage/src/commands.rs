use anyhow::Result;
use chrono::Utc;
use trading_core::{Command, CommandStatus};
use uuid::Uuid;

use crate::rows::CommandRow;
use crate::Store;

/// Terminal outcome reported by the EA for one command.
#[derive(Debug, Clone)]
pub struct CommandUpdate {
    pub command_id: Uuid,
    pub status: CommandStatus,
    pub response: Option<serde_json::Value>,
    pub error_message: Option<String>,
}

impl Store {
    /// Persist a command row. Called before the queue entry is published so
    /// a crash between the two steps loses nothing (the queue is rebuilt
    /// from PENDING rows).
    pub async fn insert_command(&self, cmd: &Command) -> Result<()> {
        sqlx::query(
            "INSERT INTO commands (command_id, account_id, command_type, payload, priority,
                status, retry_count, max_retries, timeout_seconds, created_at, linked_signal_id)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(cmd.command_id.to_string())
        .bind(cmd.account_id)
        .bind(cmd.command_type.as_str())
        .bind(serde_json::to_string(&cmd.payload)?)
        .bind(cmd.priority.value())
        .bind(cmd.status.as_str())
        .bind(cmd.retry_count)
        .bind(cmd.max_retries)
        .bind(cmd.timeout_seconds)
        .bind(cmd.created_at.to_rfc3339())
        .bind(cmd.linked_signal_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn get_command(&self, command_id: Uuid) -> Result<Option<Command>> {
        let row: Option<CommandRow> =
            sqlx::query_as("SELECT * FROM commands WHERE command_id = ?")
                .bind(command_id.to_string())
                .fetch_optional(self.pool())
                .await?;
        Ok(row.map(Into::into))
    }

    /// All PENDING commands, oldest first; used to rebuild the in-memory
    /// queues at startup.
    pub async fn list_pending_commands(&self) -> Result<Vec<Command>> {
        let rows: Vec<CommandRow> = sqlx::query_as(
            "SELECT * FROM commands WHERE status = 'PENDING' ORDER BY created_at",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Mark a command as handed to the EA.
    pub async fn mark_command_sent(&self, command_id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE commands SET status = 'EXECUTING', sent_at = ?
             WHERE command_id = ? AND status = 'PENDING'",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(command_id.to_string())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Apply a response. Returns false when the command was already in a
    /// terminal state, so late duplicates are ignored.
    pub async fn apply_command_response(&self, update: &CommandUpdate) -> Result<bool> {
        let response = update
            .response
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let result = sqlx::query(
            "UPDATE commands SET status = ?, completed_at = ?, response = ?, error_message = ?
             WHERE command_id = ? AND status IN ('PENDING', 'EXECUTING')",
        )
        .bind(update.status.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(response)
        .bind(&update.error_message)
        .bind(update.command_id.to_string())
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Return a timed-out command to PENDING with an incremented retry
    /// count. Returns false when the row moved to a terminal state first.
    pub async fn requeue_command(&self, command_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE commands SET status = 'PENDING', sent_at = NULL,
                retry_count = retry_count + 1
             WHERE command_id = ? AND status = 'EXECUTING' AND retry_count < max_retries",
        )
        .bind(command_id.to_string())
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mark a command TIMEOUT after retries are exhausted.
    pub async fn mark_command_timeout(&self, command_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE commands SET status = 'TIMEOUT', completed_at = ?
             WHERE command_id = ? AND status IN ('PENDING', 'EXECUTING')",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(command_id.to_string())
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Queue depth per account for the status endpoint.
    pub async fn count_commands_by_status(
        &self,
        account_id: i64,
        status: CommandStatus,
    ) -> Result<i64> {
        let (n,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM commands WHERE account_id = ? AND status = ?",
        )
        .bind(account_id)
        .bind(status.as_str())
        .fetch_one(self.pool())
        .await?;
        Ok(n)
    }
}
