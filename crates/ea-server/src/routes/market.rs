use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use trading_core::{Bar, Tick, Timeframe, TradingError};

use crate::error::{ApiResponse, AppError};
use crate::state::AppState;

pub fn tick_router() -> Router<AppState> {
    Router::new()
        .route("/api/ticks/batch", post(ticks_batch))
        .route("/api/ohlc/coverage", post(ohlc_coverage))
        .route("/api/ohlc/historical", post(ohlc_historical))
}

#[derive(Deserialize)]
struct TickEntry {
    symbol: String,
    bid: f64,
    ask: f64,
    #[serde(default)]
    spread: Option<f64>,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    volume: f64,
}

#[derive(Deserialize)]
struct TickBatchRequest {
    account_id: i64,
    ticks: Vec<TickEntry>,
}

async fn ticks_batch(
    State(state): State<AppState>,
    Json(req): Json<TickBatchRequest>,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    if req.ticks.is_empty() {
        return Ok(Json(ApiResponse::success(json!({"buffered": 0}))));
    }

    let mut symbols: Vec<String> = Vec::new();
    let count = req.ticks.len();
    for entry in req.ticks {
        let tick = Tick {
            spread: entry.spread.unwrap_or(entry.ask - entry.bid),
            timestamp: entry.timestamp.unwrap_or_else(Utc::now),
            symbol: entry.symbol,
            bid: entry.bid,
            ask: entry.ask,
            volume: entry.volume,
        };
        state.spreads.record(&tick.symbol, tick.spread, tick.timestamp);
        if !symbols.contains(&tick.symbol) {
            symbols.push(tick.symbol.clone());
        }
        state.ticks.push(tick);
    }

    // Downstream pipeline (position management, signal generation, gating)
    // runs off the request path; the EA only pays for the buffering.
    let account_id = req.account_id;
    let pipeline_state = state.clone();
    tokio::spawn(async move {
        for symbol in symbols {
            let Some(latest) = pipeline_state.ticks.latest(&symbol) else {
                continue;
            };
            if let Err(e) = pipeline_state.monitor.on_tick(&latest).await {
                tracing::warn!("Position monitor for {} failed: {}", symbol, e);
            }
            for timeframe in [Timeframe::H1, Timeframe::H4] {
                match pipeline_state.engine.on_tick(account_id, &symbol, timeframe).await {
                    Ok(Some(_)) => {
                        if let Err(e) = pipeline_state.trader.run_account(account_id).await {
                            tracing::warn!("Auto-trader sweep failed: {}", e);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!("Signal evaluation {} {} failed: {}", symbol, timeframe.name(), e);
                    }
                }
            }
        }
    });

    Ok(Json(ApiResponse::success(json!({"buffered": count}))))
}

#[derive(Deserialize)]
struct CoverageRequest {
    symbol: String,
    timeframe: String,
    required_bars: i64,
}

async fn ohlc_coverage(
    State(state): State<AppState>,
    Json(req): Json<CoverageRequest>,
) -> Result<Json<ApiResponse<market_data::CoverageReport>>, AppError> {
    let timeframe = Timeframe::parse(&req.timeframe)
        .ok_or_else(|| TradingError::Validation(format!("unknown timeframe {}", req.timeframe)))?;
    let report = state
        .market_data
        .coverage(&req.symbol, timeframe, req.required_bars)
        .await?;
    Ok(Json(ApiResponse::success(report)))
}

#[derive(Deserialize)]
struct BarEntry {
    open_time: DateTime<Utc>,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
}

#[derive(Deserialize)]
struct HistoricalRequest {
    symbol: String,
    timeframe: String,
    bars: Vec<BarEntry>,
}

async fn ohlc_historical(
    State(state): State<AppState>,
    Json(req): Json<HistoricalRequest>,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    let timeframe = Timeframe::parse(&req.timeframe)
        .ok_or_else(|| TradingError::Validation(format!("unknown timeframe {}", req.timeframe)))?;

    let bars: Vec<Bar> = req
        .bars
        .into_iter()
        .map(|b| Bar {
            timestamp: b.open_time,
            open: b.open,
            high: b.high,
            low: b.low,
            close: b.close,
            volume: b.volume,
        })
        .collect();

    let inserted = state
        .market_data
        .ingest_bars(&req.symbol, timeframe, &bars)
        .await?;
    Ok(Json(ApiResponse::success(json!({
        "received": bars.len(),
        "inserted": inserted,
    }))))
}
