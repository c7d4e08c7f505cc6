use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use trading_core::{Command, CommandStatus, CommandType, TradingError};
use uuid::Uuid;

use crate::error::{ApiResponse, AppError};
use crate::state::AppState;

/// Commands handed out per heartbeat or poll.
const COMMAND_BATCH_LIMIT: usize = 10;

pub fn control_router() -> Router<AppState> {
    Router::new()
        .route("/api/status", get(status))
        .route("/api/connect", post(connect))
        .route("/api/disconnect", post(disconnect))
        .route("/api/heartbeat", post(heartbeat))
        .route("/api/get_commands", post(get_commands))
        .route("/api/command_response", post(command_response))
}

async fn status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "uptime_seconds": (Utc::now() - state.started_at).num_seconds(),
    }))
}

#[derive(Deserialize)]
struct ConnectRequest {
    account_number: i64,
    broker: String,
    #[serde(default = "default_currency")]
    currency: String,
    #[serde(default)]
    balance: f64,
}

fn default_currency() -> String {
    "EUR".to_string()
}

#[derive(Serialize)]
struct ConnectResponse {
    account_id: i64,
    heartbeat_interval_seconds: u64,
    command_poll_interval_ms: u64,
}

async fn connect(
    State(state): State<AppState>,
    Json(req): Json<ConnectRequest>,
) -> Result<Json<ApiResponse<ConnectResponse>>, AppError> {
    if req.account_number <= 0 || req.broker.is_empty() {
        return Err(TradingError::Validation("account_number and broker are required".into()).into());
    }

    let account = state
        .store
        .get_or_create_account(req.account_number, &req.broker, &req.currency, req.balance)
        .await?;
    state.connections.register(account.id);

    tracing::info!(
        "EA connected: account {} ({}#{})",
        account.id,
        req.broker,
        req.account_number
    );
    Ok(Json(ApiResponse::success(ConnectResponse {
        account_id: account.id,
        heartbeat_interval_seconds: state.settings.heartbeat_interval_seconds,
        command_poll_interval_ms: state.settings.command_poll_interval_ms,
    })))
}

#[derive(Deserialize)]
struct AccountScoped {
    account_id: i64,
}

async fn disconnect(
    State(state): State<AppState>,
    Json(req): Json<AccountScoped>,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    state.connections.deregister(req.account_id);
    tracing::info!("EA disconnected: account {}", req.account_id);
    Ok(Json(ApiResponse::success(json!({"disconnected": true}))))
}

#[derive(Deserialize)]
struct HeartbeatRequest {
    account_id: i64,
    balance: f64,
    equity: f64,
    #[serde(default)]
    margin: f64,
    #[serde(default)]
    free_margin: f64,
}

#[derive(Serialize)]
struct CommandBatch {
    commands: Vec<Command>,
}

async fn heartbeat(
    State(state): State<AppState>,
    Json(req): Json<HeartbeatRequest>,
) -> Result<Json<ApiResponse<CommandBatch>>, AppError> {
    if state.store.get_account(req.account_id).await?.is_none() {
        return Err(TradingError::NotFound(format!("account {}", req.account_id)).into());
    }

    state
        .store
        .update_account_state(
            req.account_id,
            req.balance,
            req.equity,
            req.margin,
            req.free_margin,
        )
        .await?;
    state.connections.record_heartbeat(req.account_id);

    let commands = state
        .queue
        .next_batch(req.account_id, COMMAND_BATCH_LIMIT)
        .await?;
    Ok(Json(ApiResponse::success(CommandBatch { commands })))
}

async fn get_commands(
    State(state): State<AppState>,
    Json(req): Json<AccountScoped>,
) -> Result<Json<ApiResponse<CommandBatch>>, AppError> {
    let commands = state
        .queue
        .next_batch(req.account_id, COMMAND_BATCH_LIMIT)
        .await?;
    Ok(Json(ApiResponse::success(CommandBatch { commands })))
}

#[derive(Deserialize)]
struct CommandResponseRequest {
    command_id: Uuid,
    status: String,
    #[serde(default)]
    ticket: Option<i64>,
    #[serde(default)]
    open_price: Option<f64>,
    #[serde(default)]
    error: Option<String>,
}

async fn command_response(
    State(state): State<AppState>,
    Json(req): Json<CommandResponseRequest>,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    let command = state
        .queue
        .store()
        .get_command(req.command_id)
        .await?
        .ok_or_else(|| TradingError::NotFound(format!("command {}", req.command_id)))?;

    let success = req.status.eq_ignore_ascii_case("completed");
    let response_payload = json!({
        "ticket": req.ticket,
        "open_price": req.open_price,
    });

    // Round-trip latency from delivery to response.
    if let Some(sent_at) = command.sent_at {
        let latency_ms = (Utc::now() - sent_at).num_milliseconds() as f64;
        state.connections.record_latency(command.account_id, latency_ms);
    }

    let outcome = state
        .queue
        .complete(req.command_id, success, Some(response_payload), req.error.clone())
        .await?;

    // Late duplicates have no side effects.
    if outcome == command_queue::CompletionOutcome::Duplicate {
        return Ok(Json(ApiResponse::success(json!({"duplicate": true}))));
    }

    let retriable = req
        .error
        .as_deref()
        .map(TradingError::is_retriable_text)
        .unwrap_or(false);
    let terminal_failure =
        !success && outcome == command_queue::CompletionOutcome::Applied;

    match command.command_type {
        CommandType::OpenTrade => {
            if success {
                if let Some(ticket) = req.ticket {
                    crate::response::record_opened_trade(&state, &command, ticket, req.open_price)
                        .await?;
                }
                state
                    .trader
                    .handle_open_result(command.account_id, true, false)
                    .await?;
            } else if terminal_failure {
                state
                    .trader
                    .handle_open_result(command.account_id, false, retriable)
                    .await?;
                state.connections.record_failure(command.account_id);
            }
        }
        CommandType::ModifyTrade => {
            state
                .monitor
                .handle_modify_response(command.account_id, &command.payload, success)
                .await?;
            if terminal_failure {
                state.connections.record_failure(command.account_id);
            }
        }
        _ => {
            if terminal_failure {
                state.connections.record_failure(command.account_id);
            }
        }
    }

    Ok(Json(ApiResponse::success(json!({
        "recorded": true,
        "final_status": if success {
            CommandStatus::Completed.as_str()
        } else {
            CommandStatus::Failed.as_str()
        },
    }))))
}
