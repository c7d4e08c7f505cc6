use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use technical_analysis::IndicatorSnapshot;
use tokio::sync::OnceCell;
use trading_core::{Bar, Timeframe};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CohortKey {
    symbol: String,
    timeframe: Timeframe,
    bar_close: DateTime<Utc>,
}

/// Indicator cohort cache. One entry holds every indicator for one closing
/// bar, so an evaluation can never mix values from different bar closes.
/// Concurrent misses on the same key compute once (single-flight).
pub struct IndicatorCache {
    entries: DashMap<CohortKey, Arc<OnceCell<Arc<IndicatorSnapshot>>>>,
}

impl Default for IndicatorCache {
    fn default() -> Self {
        Self::new()
    }
}

impl IndicatorCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Snapshot for the cohort identified by the series' last bar. The bars
    /// are only read on a miss.
    pub async fn snapshot_for(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        bars: &[Bar],
    ) -> Option<Arc<IndicatorSnapshot>> {
        let bar_close = bars.last()?.timestamp;
        let key = CohortKey {
            symbol: symbol.to_string(),
            timeframe,
            bar_close,
        };

        let cell = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let snapshot = cell
            .get_or_init(|| async { Arc::new(IndicatorSnapshot::compute(bars)) })
            .await
            .clone();

        // A new bar close invalidates earlier cohorts for the same key
        // atomically with respect to this map.
        self.entries.retain(|k, _| {
            k.symbol != symbol || k.timeframe != timeframe || k.bar_close >= bar_close
        });

        Some(snapshot)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn bars_ending_at(close_time: DateTime<Utc>, n: usize) -> Vec<Bar> {
        (0..n)
            .map(|i| {
                let base = 1.08 + i as f64 * 0.0001;
                Bar {
                    timestamp: close_time - Duration::hours((n - 1 - i) as i64),
                    open: base,
                    high: base + 0.0002,
                    low: base - 0.0001,
                    close: base + 0.0001,
                    volume: 100.0,
                }
            })
            .collect()
    }

    #[tokio::test]
    async fn same_cohort_computed_once() {
        let cache = IndicatorCache::new();
        let now = Utc::now();
        let bars = bars_ending_at(now, 60);

        let a = cache.snapshot_for("EURUSD", Timeframe::H1, &bars).await.unwrap();
        let b = cache.snapshot_for("EURUSD", Timeframe::H1, &bars).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn new_bar_close_evicts_old_cohort() {
        let cache = IndicatorCache::new();
        let now = Utc::now();

        cache
            .snapshot_for("EURUSD", Timeframe::H1, &bars_ending_at(now, 60))
            .await
            .unwrap();
        cache
            .snapshot_for("EURUSD", Timeframe::H1, &bars_ending_at(now + Duration::hours(1), 60))
            .await
            .unwrap();

        // Only the newer cohort remains
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn cohorts_are_per_symbol_and_timeframe() {
        let cache = IndicatorCache::new();
        let now = Utc::now();
        let bars = bars_ending_at(now, 60);

        cache.snapshot_for("EURUSD", Timeframe::H1, &bars).await.unwrap();
        cache.snapshot_for("GBPUSD", Timeframe::H1, &bars).await.unwrap();
        cache.snapshot_for("EURUSD", Timeframe::H4, &bars).await.unwrap();
        assert_eq!(cache.len(), 3);
    }
}
