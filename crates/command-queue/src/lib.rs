use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use storage::{CommandUpdate, Store};
use tokio::sync::broadcast;
use trading_core::{
    Command, CommandPriority, CommandStatus, CommandType, TradingError,
};
use uuid::Uuid;

#[cfg(test)]
#[path = "tests.rs"]
mod queue_tests;

/// Heap entry: priority desc, then enqueue time asc, then arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
struct QueueEntry {
    priority: i32,
    created_at: DateTime<Utc>,
    seq: u64,
    command_id: Uuid,
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.created_at.cmp(&self.created_at))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A command the EA has pulled but not yet answered.
#[derive(Debug, Clone)]
struct InflightEntry {
    account_id: i64,
    command_type: CommandType,
    deadline: DateTime<Utc>,
}

/// What happened when a response (or timeout) was processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// Terminal result recorded.
    Applied,
    /// The command was already terminal; the response was dropped.
    Duplicate,
    /// Failure was retriable and the command went back to PENDING.
    Requeued,
}

/// A command that exhausted its retries, for the failure-count hooks.
#[derive(Debug, Clone)]
pub struct ExpiredCommand {
    pub command_id: Uuid,
    pub account_id: i64,
    pub command_type: CommandType,
}

/// Per-account priority command queues. Rows persist before queue entries
/// publish, so a crash between the two steps is recovered by
/// `rebuild_from_pending` at startup. Delivery is at-least-once.
pub struct CommandQueue {
    store: Store,
    queues: DashMap<i64, BinaryHeap<QueueEntry>>,
    inflight: DashMap<Uuid, InflightEntry>,
    seq: AtomicU64,
    redis: Option<ConnectionManager>,
}

impl CommandQueue {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            queues: DashMap::new(),
            inflight: DashMap::new(),
            seq: AtomicU64::new(0),
            redis: None,
        }
    }

    /// Attach a Redis mirror for latency-sensitive delivery. The in-process
    /// queue stays the source of truth; mirror failures only log.
    pub async fn with_redis(mut self, redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let manager = ConnectionManager::new(client).await?;
        self.redis = Some(manager);
        Ok(self)
    }

    /// Persist and publish a new command. Commands for disconnected
    /// accounts simply wait in the queue until the next poll.
    pub async fn enqueue(
        &self,
        account_id: i64,
        command_type: CommandType,
        payload: serde_json::Value,
        priority: CommandPriority,
        linked_signal_id: Option<i64>,
    ) -> Result<Uuid> {
        let mut cmd = Command::new(account_id, command_type, payload, priority);
        cmd.linked_signal_id = linked_signal_id;

        self.store.insert_command(&cmd).await?;
        self.publish(&cmd);
        self.mirror_to_redis(&cmd).await;

        tracing::debug!(
            "Enqueued {} {} for account {} (priority {})",
            command_type.as_str(),
            cmd.command_id,
            account_id,
            priority.value()
        );
        Ok(cmd.command_id)
    }

    fn publish(&self, cmd: &Command) {
        let entry = QueueEntry {
            priority: cmd.priority.value(),
            created_at: cmd.created_at,
            seq: self.seq.fetch_add(1, AtomicOrdering::Relaxed),
            command_id: cmd.command_id,
        };
        self.queues.entry(cmd.account_id).or_default().push(entry);
    }

    async fn mirror_to_redis(&self, cmd: &Command) {
        if let Some(redis) = &self.redis {
            let mut conn = redis.clone();
            let key = format!("commands:{}", cmd.account_id);
            let payload = match serde_json::to_string(cmd) {
                Ok(p) => p,
                Err(_) => return,
            };
            let result: redis::RedisResult<()> = redis::cmd("LPUSH")
                .arg(&key)
                .arg(payload)
                .query_async(&mut conn)
                .await;
            if let Err(e) = result {
                tracing::warn!("Redis mirror for {} failed: {}", cmd.command_id, e);
            }
        }
    }

    /// Pull up to `limit` commands for an account in (priority desc, FIFO)
    /// order. Pulled commands become EXECUTING with a delivery deadline;
    /// unanswered ones return to the queue via `check_timeouts`.
    pub async fn next_batch(&self, account_id: i64, limit: usize) -> Result<Vec<Command>> {
        let mut picked = Vec::new();
        {
            let mut queue = match self.queues.get_mut(&account_id) {
                Some(q) => q,
                None => return Ok(Vec::new()),
            };
            while picked.len() < limit {
                match queue.pop() {
                    Some(entry) => picked.push(entry.command_id),
                    None => break,
                }
            }
        }

        let mut out = Vec::with_capacity(picked.len());
        for command_id in picked {
            // Skip entries whose row went terminal while queued (e.g. a
            // duplicate entry from a crash-recovery rebuild).
            let cmd = match self.store.get_command(command_id).await? {
                Some(c) if c.status == CommandStatus::Pending => c,
                _ => continue,
            };

            self.store.mark_command_sent(command_id).await?;
            self.inflight.insert(
                command_id,
                InflightEntry {
                    account_id,
                    command_type: cmd.command_type,
                    deadline: Utc::now() + chrono::Duration::seconds(cmd.timeout_seconds),
                },
            );
            out.push(cmd);
        }
        Ok(out)
    }

    /// Process a command_response from the EA. Late duplicates are dropped;
    /// retriable failures return the command to PENDING until max_retries.
    pub async fn complete(
        &self,
        command_id: Uuid,
        success: bool,
        response: Option<serde_json::Value>,
        error: Option<String>,
    ) -> Result<CompletionOutcome> {
        self.inflight.remove(&command_id);

        if !success {
            let retriable = error
                .as_deref()
                .map(TradingError::is_retriable_text)
                .unwrap_or(false);
            if retriable {
                if self.store.requeue_command(command_id).await? {
                    if let Some(cmd) = self.store.get_command(command_id).await? {
                        self.publish(&cmd);
                        tracing::info!(
                            "Command {} failed with retriable error, retry {}/{}",
                            command_id,
                            cmd.retry_count,
                            cmd.max_retries
                        );
                        return Ok(CompletionOutcome::Requeued);
                    }
                }
                // Retries exhausted; fall through to a terminal FAILED.
            }
        }

        let update = CommandUpdate {
            command_id,
            status: if success {
                CommandStatus::Completed
            } else {
                CommandStatus::Failed
            },
            response,
            error_message: error,
        };
        if self.store.apply_command_response(&update).await? {
            Ok(CompletionOutcome::Applied)
        } else {
            Ok(CompletionOutcome::Duplicate)
        }
    }

    /// Expire overdue in-flight commands: retriable ones return to PENDING,
    /// exhausted ones become TIMEOUT and are reported to the caller.
    pub async fn check_timeouts(&self, now: DateTime<Utc>) -> Result<Vec<ExpiredCommand>> {
        let overdue: Vec<(Uuid, InflightEntry)> = self
            .inflight
            .iter()
            .filter(|e| e.value().deadline <= now)
            .map(|e| (*e.key(), e.value().clone()))
            .collect();

        let mut expired = Vec::new();
        for (command_id, entry) in overdue {
            self.inflight.remove(&command_id);

            if self.store.requeue_command(command_id).await? {
                if let Some(cmd) = self.store.get_command(command_id).await? {
                    tracing::warn!(
                        "Command {} timed out, retry {}/{}",
                        command_id,
                        cmd.retry_count,
                        cmd.max_retries
                    );
                    self.publish(&cmd);
                }
            } else if self.store.mark_command_timeout(command_id).await? {
                tracing::warn!("Command {} timed out after max retries", command_id);
                expired.push(ExpiredCommand {
                    command_id,
                    account_id: entry.account_id,
                    command_type: entry.command_type,
                });
            }
        }
        Ok(expired)
    }

    /// Rebuild the in-memory queues from PENDING rows after a restart.
    pub async fn rebuild_from_pending(&self) -> Result<usize> {
        let pending = self.store.list_pending_commands().await?;
        let count = pending.len();
        for cmd in pending {
            self.publish(&cmd);
        }
        if count > 0 {
            tracing::info!("Rebuilt command queue with {} pending commands", count);
        }
        Ok(count)
    }

    pub fn pending_depth(&self, account_id: i64) -> usize {
        self.queues.get(&account_id).map(|q| q.len()).unwrap_or(0)
    }

    pub fn inflight_count(&self) -> usize {
        self.inflight.len()
    }

    pub fn store(&self) -> &Store {
        &self.store
    }
}

/// Periodic timeout sweep. Expired OPEN_TRADE commands are handed to
/// `on_expired` so the caller can advance failure counters.
pub async fn run_timeout_worker<F>(
    queue: std::sync::Arc<CommandQueue>,
    mut shutdown: broadcast::Receiver<()>,
    on_expired: F,
) where
    F: Fn(ExpiredCommand) + Send + Sync + 'static,
{
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match queue.check_timeouts(Utc::now()).await {
                    Ok(expired) => {
                        for cmd in expired {
                            on_expired(cmd);
                        }
                    }
                    Err(e) => tracing::warn!("Timeout sweep failed: {}", e),
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Command timeout worker shutting down");
                return;
            }
        }
    }
}
