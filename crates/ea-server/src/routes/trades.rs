use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use trading_core::{BrokerSymbolInfo, CloseReason, TradeStatus, TradingError};

use crate::error::{ApiResponse, AppError};
use crate::reconcile::{reconcile_positions, EaPosition, ReconcileSummary};
use crate::state::AppState;

pub fn trade_router() -> Router<AppState> {
    Router::new()
        .route("/api/trades/sync", post(trades_sync))
        .route("/api/trades/update", post(trades_update))
}

#[derive(Deserialize)]
struct SyncRequest {
    account_id: i64,
    positions: Vec<EaPosition>,
}

async fn trades_sync(
    State(state): State<AppState>,
    Json(req): Json<SyncRequest>,
) -> Result<Json<ApiResponse<ReconcileSummary>>, AppError> {
    let summary = reconcile_positions(&state.store, req.account_id, &req.positions).await?;
    if summary.closed + summary.created + summary.updated > 0 {
        tracing::info!(
            "Sync for account {}: {} closed, {} created, {} updated",
            req.account_id,
            summary.closed,
            summary.created,
            summary.updated
        );
    }
    Ok(Json(ApiResponse::success(summary)))
}

#[derive(Deserialize)]
struct TradeUpdateRequest {
    account_id: i64,
    ticket: i64,
    status: String,
    #[serde(default)]
    sl: Option<f64>,
    #[serde(default)]
    tp: Option<f64>,
    #[serde(default)]
    close_price: Option<f64>,
    #[serde(default)]
    close_time: Option<DateTime<Utc>>,
    #[serde(default)]
    close_reason: Option<String>,
    #[serde(default)]
    profit: Option<f64>,
    #[serde(default)]
    commission: Option<f64>,
    #[serde(default)]
    swap: Option<f64>,
}

async fn trades_update(
    State(state): State<AppState>,
    Json(req): Json<TradeUpdateRequest>,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    let trade = state
        .store
        .get_trade_by_ticket(req.account_id, req.ticket)
        .await?
        .ok_or_else(|| TradingError::NotFound(format!("trade ticket {}", req.ticket)))?;

    match req.status.as_str() {
        "open" => {
            // Level refresh; idempotent against the sync path.
            state
                .store
                .set_trade_levels(trade.id, req.sl.or(trade.sl), req.tp.or(trade.tp))
                .await?;
            Ok(Json(ApiResponse::success(json!({"updated": true}))))
        }
        "closed" => {
            if trade.status == TradeStatus::Closed {
                // Idempotent: a re-reported close has no further effect.
                return Ok(Json(ApiResponse::success(json!({"duplicate": true}))));
            }

            let reported = req
                .close_reason
                .as_deref()
                .map(CloseReason::parse)
                .unwrap_or(CloseReason::Unknown);
            // A MANUAL report may actually be a protective worker's close.
            let worker_reason = state
                .store
                .find_close_command_reason(req.account_id, req.ticket)
                .await?;
            let close_reason =
                position_manager::resolve_close_reason(reported, worker_reason.as_deref());

            let broker = state
                .store
                .get_broker_symbol(req.account_id, &trade.symbol)
                .await?
                .unwrap_or_else(|| BrokerSymbolInfo::fallback(req.account_id, &trade.symbol));
            let latest = state.ticks.latest(&trade.symbol);

            let update = position_manager::close_update_for(
                &trade,
                &broker,
                req.close_price,
                req.close_time.unwrap_or_else(Utc::now),
                close_reason,
                req.profit,
                req.commission,
                req.swap,
                latest.as_ref(),
            );
            state.store.close_trade(trade.id, &update).await?;
            state.monitor.forget_trade(trade.id);

            tracing::info!(
                "Trade closed: #{} {} {} ({:+.2})",
                req.ticket,
                trade.symbol,
                close_reason.as_str(),
                req.profit.unwrap_or(0.0)
            );

            // Risk hooks: SL-hit cooldowns and rolling symbol performance.
            if close_reason == CloseReason::SlHit {
                risk_manager::note_sl_hit(
                    &state.store,
                    &state.sl_pauses,
                    &trade.symbol,
                    req.account_id,
                )
                .await?;
            }
            risk_manager::refresh_symbol_performance(&state.store, &trade.symbol).await?;

            Ok(Json(ApiResponse::success(json!({
                "closed": true,
                "close_reason": close_reason.as_str(),
            }))))
        }
        other => {
            Err(TradingError::Validation(format!("unknown trade status {:?}", other)).into())
        }
    }
}
