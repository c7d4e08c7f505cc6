use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use trading_core::{BrokerSymbolInfo, CommandStatus, GlobalSettings, TradingError};

use crate::error::{ApiResponse, AppError};
use crate::state::AppState;

pub fn log_router() -> Router<AppState> {
    Router::new().route("/api/log", post(ea_log))
}

pub fn ops_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/api/system/status", get(system_status))
        .route("/api/admin/reset_breaker", post(reset_breaker))
        .route("/api/admin/settings", post(update_settings))
        .route("/api/admin/symbol/pause", post(pause_symbol))
        .route("/api/admin/symbol/resume", post(resume_symbol))
        .route("/api/admin/broker_symbol", post(upsert_broker_symbol))
}

#[derive(Deserialize)]
struct LogRequest {
    #[serde(default)]
    account_id: Option<i64>,
    level: String,
    message: String,
}

async fn ea_log(Json(req): Json<LogRequest>) -> Json<ApiResponse<Value>> {
    let account = req.account_id.unwrap_or(0);
    match req.level.to_lowercase().as_str() {
        "error" => tracing::error!("EA[{}]: {}", account, req.message),
        "warn" | "warning" => tracing::warn!("EA[{}]: {}", account, req.message),
        "debug" => tracing::debug!("EA[{}]: {}", account, req.message),
        _ => tracing::info!("EA[{}]: {}", account, req.message),
    }
    Json(ApiResponse::success(json!({"logged": true})))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "uptime_seconds": (Utc::now() - state.started_at).num_seconds(),
    }))
}

async fn system_status(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    let mut accounts = Vec::new();
    for account in state.store.list_accounts().await? {
        let connection = state.connections.snapshot(account.id);
        let pending = state
            .store
            .count_commands_by_status(account.id, CommandStatus::Pending)
            .await?;
        let open_trades = state.store.count_open_trades(account.id).await?;
        let breaker = state.breaker.state(account.id);

        accounts.push(json!({
            "account_id": account.id,
            "broker": account.broker_name,
            "balance": account.balance,
            "equity": account.equity,
            "profit_today": account.profit_today,
            "connection": connection,
            "healthy": state.connections.is_healthy(account.id),
            "pending_commands": pending,
            "queued_in_memory": state.queue.pending_depth(account.id),
            "open_trades": open_trades,
            "circuit_breaker_tripped": breaker.tripped,
            "failed_command_count": breaker.failed_command_count,
        }));
    }

    Ok(Json(ApiResponse::success(json!({
        "connections": accounts,
        "commands": {
            "inflight": state.queue.inflight_count(),
        },
        "data": {
            "buffered_ticks": state.ticks.buffered_count(),
            "dropped_ticks": state.ticks.dropped_count(),
            "tracked_symbols": state.ticks.tracked_symbols(),
            "paused_symbols": state.sl_pauses.paused_symbols(),
        },
    }))))
}

#[derive(Deserialize)]
struct AccountScoped {
    account_id: i64,
}

async fn reset_breaker(
    State(state): State<AppState>,
    Json(req): Json<AccountScoped>,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    state.breaker.reset(req.account_id).await?;
    Ok(Json(ApiResponse::success(json!({"reset": true}))))
}

async fn update_settings(
    State(state): State<AppState>,
    Json(settings): Json<GlobalSettings>,
) -> Result<Json<ApiResponse<GlobalSettings>>, AppError> {
    if settings.risk_per_trade_percent <= 0.0 || settings.risk_per_trade_percent > 10.0 {
        return Err(
            TradingError::Validation("risk_per_trade_percent must be in (0, 10]".into()).into(),
        );
    }
    if settings.max_positions <= 0 {
        return Err(TradingError::Validation("max_positions must be positive".into()).into());
    }
    state.store.save_settings(&settings).await?;
    tracing::info!("Global settings updated");
    Ok(Json(ApiResponse::success(settings)))
}

#[derive(Deserialize)]
struct SymbolPauseRequest {
    symbol: String,
    #[serde(default)]
    minutes: Option<i64>,
}

async fn pause_symbol(
    State(state): State<AppState>,
    Json(req): Json<SymbolPauseRequest>,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    let minutes = req.minutes.unwrap_or(60);
    state.sl_pauses.pause(&req.symbol, minutes);
    state.store.set_symbol_status(&req.symbol, "disabled").await?;
    Ok(Json(ApiResponse::success(json!({"paused_minutes": minutes}))))
}

async fn resume_symbol(
    State(state): State<AppState>,
    Json(req): Json<SymbolPauseRequest>,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    state.sl_pauses.clear(&req.symbol);
    state.store.set_symbol_status(&req.symbol, "active").await?;
    Ok(Json(ApiResponse::success(json!({"resumed": true}))))
}

async fn upsert_broker_symbol(
    State(state): State<AppState>,
    Json(info): Json<BrokerSymbolInfo>,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    if info.volume_min <= 0.0 || info.volume_step <= 0.0 || info.volume_max < info.volume_min {
        return Err(TradingError::Validation("invalid volume constraints".into()).into());
    }
    state.store.upsert_broker_symbol(&info).await?;
    Ok(Json(ApiResponse::success(json!({"updated": true}))))
}
