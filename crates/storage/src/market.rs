use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use trading_core::{Bar, Tick, Timeframe};

use crate::parse_ts;
use crate::Store;

impl Store {
    /// Batch-insert a drained tick buffer. One multi-row statement per call
    /// keeps the flusher cheap.
    pub async fn insert_ticks(&self, ticks: &[Tick]) -> Result<()> {
        if ticks.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool().begin().await?;
        for tick in ticks {
            sqlx::query(
                "INSERT INTO ticks (symbol, bid, ask, spread, volume, timestamp)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&tick.symbol)
            .bind(tick.bid)
            .bind(tick.ask)
            .bind(tick.spread)
            .bind(tick.volume)
            .bind(tick.timestamp.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn latest_tick(&self, symbol: &str) -> Result<Option<Tick>> {
        let row: Option<(String, f64, f64, f64, f64, String)> = sqlx::query_as(
            "SELECT symbol, bid, ask, spread, volume, timestamp FROM ticks
             WHERE symbol = ? ORDER BY timestamp DESC LIMIT 1",
        )
        .bind(symbol)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(|(symbol, bid, ask, spread, volume, ts)| Tick {
            symbol,
            bid,
            ask,
            spread,
            volume,
            timestamp: parse_ts(&ts),
        }))
    }

    /// Average spread over a lookback window, for the pre-execution gate.
    pub async fn average_spread(&self, symbol: &str, window_minutes: i64) -> Result<Option<f64>> {
        let cutoff = (Utc::now() - Duration::minutes(window_minutes)).to_rfc3339();
        let row: Option<(Option<f64>,)> = sqlx::query_as(
            "SELECT AVG(spread) FROM ticks WHERE symbol = ? AND timestamp >= ?",
        )
        .bind(symbol)
        .bind(cutoff)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.and_then(|(v,)| v))
    }

    /// Delete ticks older than the retention window. Returns rows removed.
    pub async fn prune_ticks(&self, retention_days: i64) -> Result<u64> {
        let cutoff = (Utc::now() - Duration::days(retention_days)).to_rfc3339();
        let result = sqlx::query("DELETE FROM ticks WHERE timestamp < ?")
            .bind(cutoff)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }

    /// Idempotent OHLC insert: re-sent bars leave the stored set unchanged.
    pub async fn insert_bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        bars: &[Bar],
    ) -> Result<u64> {
        if bars.is_empty() {
            return Ok(0);
        }

        let mut inserted = 0u64;
        let mut tx = self.pool().begin().await?;
        for bar in bars {
            let result = sqlx::query(
                "INSERT INTO ohlc_bars (symbol, timeframe, open_time, open, high, low, close, volume)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(symbol, timeframe, open_time) DO NOTHING",
            )
            .bind(symbol)
            .bind(timeframe.name())
            .bind(bar.timestamp.to_rfc3339())
            .bind(bar.open)
            .bind(bar.high)
            .bind(bar.low)
            .bind(bar.close)
            .bind(bar.volume)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }
        tx.commit().await?;
        Ok(inserted)
    }

    /// Most recent `limit` bars, oldest first (indicator input order).
    pub async fn recent_bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: i64,
    ) -> Result<Vec<Bar>> {
        let rows: Vec<(String, f64, f64, f64, f64, f64)> = sqlx::query_as(
            "SELECT open_time, open, high, low, close, volume FROM ohlc_bars
             WHERE symbol = ? AND timeframe = ?
             ORDER BY open_time DESC LIMIT ?",
        )
        .bind(symbol)
        .bind(timeframe.name())
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        let mut bars: Vec<Bar> = rows
            .into_iter()
            .map(|(ts, open, high, low, close, volume)| Bar {
                timestamp: parse_ts(&ts),
                open,
                high,
                low,
                close,
                volume,
            })
            .collect();
        bars.reverse();
        Ok(bars)
    }

    pub async fn count_bars(&self, symbol: &str, timeframe: Timeframe) -> Result<i64> {
        let (n,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM ohlc_bars WHERE symbol = ? AND timeframe = ?",
        )
        .bind(symbol)
        .bind(timeframe.name())
        .fetch_one(self.pool())
        .await?;
        Ok(n)
    }

    /// Coverage of the most recent `required_bars` slots, used by the EA to
    /// decide whether to upload history. Weekends make a strict bar-per-slot
    /// count unrealistic for FX, so coverage counts stored bars against the
    /// requirement.
    pub async fn bar_coverage(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        required_bars: i64,
    ) -> Result<f64> {
        if required_bars <= 0 {
            return Ok(100.0);
        }
        let window_start = Utc::now()
            - Duration::minutes(timeframe.to_minutes() * required_bars * 2);
        let (n,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM ohlc_bars
             WHERE symbol = ? AND timeframe = ? AND open_time >= ?",
        )
        .bind(symbol)
        .bind(timeframe.name())
        .bind(window_start.to_rfc3339())
        .fetch_one(self.pool())
        .await?;

        Ok(((n as f64 / required_bars as f64) * 100.0).min(100.0))
    }

    pub async fn latest_bar_time(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<Option<DateTime<Utc>>> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT open_time FROM ohlc_bars WHERE symbol = ? AND timeframe = ?
             ORDER BY open_time DESC LIMIT 1",
        )
        .bind(symbol)
        .bind(timeframe.name())
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(|(ts,)| parse_ts(&ts)))
    }
}
