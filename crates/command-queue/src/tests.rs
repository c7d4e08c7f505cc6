use chrono::{Duration, Utc};
use serde_json::json;
use storage::Store;
use trading_core::{CommandPriority, CommandStatus, CommandType};

use crate::{CommandQueue, CompletionOutcome};

async fn setup_queue() -> CommandQueue {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory SQLite");
    let store = Store::new(pool);
    store.init_tables().await.unwrap();
    CommandQueue::new(store)
}

#[tokio::test]
async fn delivery_order_priority_then_fifo() {
    let queue = setup_queue().await;

    let low = queue
        .enqueue(1, CommandType::Ping, json!({}), CommandPriority::Low, None)
        .await
        .unwrap();
    let normal_a = queue
        .enqueue(1, CommandType::GetAccountInfo, json!({}), CommandPriority::Normal, None)
        .await
        .unwrap();
    let critical = queue
        .enqueue(1, CommandType::CloseAll, json!({}), CommandPriority::Critical, None)
        .await
        .unwrap();
    let normal_b = queue
        .enqueue(1, CommandType::GetAccountInfo, json!({}), CommandPriority::Normal, None)
        .await
        .unwrap();

    let batch = queue.next_batch(1, 10).await.unwrap();
    let ids: Vec<_> = batch.iter().map(|c| c.command_id).collect();
    assert_eq!(ids, vec![critical, normal_a, normal_b, low]);
}

#[tokio::test]
async fn queues_are_per_account() {
    let queue = setup_queue().await;

    queue
        .enqueue(1, CommandType::Ping, json!({}), CommandPriority::Normal, None)
        .await
        .unwrap();
    queue
        .enqueue(2, CommandType::Ping, json!({}), CommandPriority::Normal, None)
        .await
        .unwrap();

    assert_eq!(queue.next_batch(1, 10).await.unwrap().len(), 1);
    assert_eq!(queue.next_batch(1, 10).await.unwrap().len(), 0);
    assert_eq!(queue.next_batch(2, 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn batch_limit_respected() {
    let queue = setup_queue().await;
    for _ in 0..15 {
        queue
            .enqueue(1, CommandType::Ping, json!({}), CommandPriority::Normal, None)
            .await
            .unwrap();
    }
    assert_eq!(queue.next_batch(1, 10).await.unwrap().len(), 10);
    assert_eq!(queue.next_batch(1, 10).await.unwrap().len(), 5);
}

#[tokio::test]
async fn completed_command_never_redelivered() {
    let queue = setup_queue().await;
    let id = queue
        .enqueue(1, CommandType::Ping, json!({}), CommandPriority::Normal, None)
        .await
        .unwrap();

    let batch = queue.next_batch(1, 10).await.unwrap();
    assert_eq!(batch.len(), 1);

    let outcome = queue
        .complete(id, true, Some(json!({"pong": true})), None)
        .await
        .unwrap();
    assert_eq!(outcome, CompletionOutcome::Applied);

    // Duplicate response is ignored
    let outcome = queue.complete(id, true, None, None).await.unwrap();
    assert_eq!(outcome, CompletionOutcome::Duplicate);

    // No timeout sweep resurrects it
    let expired = queue.check_timeouts(Utc::now() + Duration::hours(1)).await.unwrap();
    assert!(expired.is_empty());
    assert!(queue.next_batch(1, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn retriable_failure_requeues() {
    let queue = setup_queue().await;
    let id = queue
        .enqueue(1, CommandType::OpenTrade, json!({}), CommandPriority::Normal, None)
        .await
        .unwrap();

    queue.next_batch(1, 10).await.unwrap();
    let outcome = queue
        .complete(id, false, None, Some("connection reset".to_string()))
        .await
        .unwrap();
    assert_eq!(outcome, CompletionOutcome::Requeued);

    // The command is deliverable again with a bumped retry count
    let batch = queue.next_batch(1, 10).await.unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].retry_count, 1);
}

#[tokio::test]
async fn permanent_failure_is_terminal() {
    let queue = setup_queue().await;
    let id = queue
        .enqueue(1, CommandType::OpenTrade, json!({}), CommandPriority::Normal, None)
        .await
        .unwrap();

    queue.next_batch(1, 10).await.unwrap();
    let outcome = queue
        .complete(id, false, None, Some("invalid stops".to_string()))
        .await
        .unwrap();
    assert_eq!(outcome, CompletionOutcome::Applied);

    let cmd = queue.store().get_command(id).await.unwrap().unwrap();
    assert_eq!(cmd.status, CommandStatus::Failed);
    assert!(queue.next_batch(1, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn timeout_retries_then_expires() {
    let queue = setup_queue().await;
    let id = queue
        .enqueue(1, CommandType::OpenTrade, json!({}), CommandPriority::Normal, None)
        .await
        .unwrap();

    // Deliver and time out four times: three retries, then terminal
    for round in 0..3 {
        let batch = queue.next_batch(1, 10).await.unwrap();
        assert_eq!(batch.len(), 1, "round {}", round);
        let expired = queue
            .check_timeouts(Utc::now() + Duration::minutes(5))
            .await
            .unwrap();
        assert!(expired.is_empty(), "round {} should retry", round);
    }

    let batch = queue.next_batch(1, 10).await.unwrap();
    assert_eq!(batch.len(), 1);
    let expired = queue
        .check_timeouts(Utc::now() + Duration::minutes(5))
        .await
        .unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].command_id, id);
    assert_eq!(expired[0].command_type, CommandType::OpenTrade);

    let cmd = queue.store().get_command(id).await.unwrap().unwrap();
    assert_eq!(cmd.status, CommandStatus::Timeout);
}

#[tokio::test]
async fn queue_rebuilds_from_pending_rows() {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let store = Store::new(pool);
    store.init_tables().await.unwrap();

    // First queue instance persists a command, then "crashes"
    let queue = CommandQueue::new(store.clone());
    let id = queue
        .enqueue(7, CommandType::ModifyTrade, json!({"ticket": 1}), CommandPriority::High, None)
        .await
        .unwrap();
    drop(queue);

    // A fresh instance rebuilds from PENDING rows
    let queue = CommandQueue::new(store);
    assert_eq!(queue.rebuild_from_pending().await.unwrap(), 1);
    let batch = queue.next_batch(7, 10).await.unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].command_id, id);
}
