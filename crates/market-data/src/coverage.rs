use anyhow::Result;
use serde::Serialize;
use storage::Store;
use trading_core::{Bar, Timeframe};

/// Answer to the EA's coverage probe.
#[derive(Debug, Clone, Serialize)]
pub struct CoverageReport {
    pub symbol: String,
    pub timeframe: String,
    pub coverage_percent: f64,
    pub needs_update: bool,
}

/// OHLC coverage and historical ingest, backed by the global bar store.
#[derive(Clone)]
pub struct MarketDataService {
    store: Store,
    /// Coverage below this triggers an EA upload request.
    coverage_floor: f64,
}

impl MarketDataService {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            coverage_floor: 90.0,
        }
    }

    pub async fn coverage(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        required_bars: i64,
    ) -> Result<CoverageReport> {
        let coverage_percent = self.store.bar_coverage(symbol, timeframe, required_bars).await?;
        Ok(CoverageReport {
            symbol: symbol.to_string(),
            timeframe: timeframe.name().to_string(),
            coverage_percent,
            needs_update: coverage_percent < self.coverage_floor,
        })
    }

    /// Idempotent historical ingest; returns how many bars were new.
    pub async fn ingest_bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        bars: &[Bar],
    ) -> Result<u64> {
        let inserted = self.store.insert_bars(symbol, timeframe, bars).await?;
        if inserted > 0 {
            tracing::info!(
                "Ingested {} new {} bars for {} ({} supplied)",
                inserted,
                timeframe.name(),
                symbol,
                bars.len()
            );
        }
        Ok(inserted)
    }

    pub async fn recent_bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: i64,
    ) -> Result<Vec<Bar>> {
        self.store.recent_bars(symbol, timeframe, limit).await
    }
}
