use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use storage::Store;
use tokio::sync::{broadcast, Notify};
use trading_core::Tick;

/// Per-symbol bounded tick rings. Ticks past capacity drop the oldest entry
/// and bump a counter; heartbeats and trade events never pass through here,
/// so dropping is acceptable backpressure.
pub struct TickBuffer {
    rings: DashMap<String, VecDeque<Tick>>,
    latest: DashMap<String, Tick>,
    capacity: usize,
    flush_threshold: usize,
    dropped: AtomicU64,
    flush_hint: Notify,
}

impl TickBuffer {
    pub fn new(capacity: usize, flush_threshold: usize) -> Self {
        Self {
            rings: DashMap::new(),
            latest: DashMap::new(),
            capacity,
            flush_threshold,
            dropped: AtomicU64::new(0),
            flush_hint: Notify::new(),
        }
    }

    pub fn push(&self, tick: Tick) {
        self.latest.insert(tick.symbol.clone(), tick.clone());

        let mut ring = self.rings.entry(tick.symbol.clone()).or_default();
        if ring.len() >= self.capacity {
            ring.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        ring.push_back(tick);

        if ring.len() >= self.flush_threshold {
            self.flush_hint.notify_one();
        }
    }

    pub fn push_batch(&self, ticks: Vec<Tick>) {
        for tick in ticks {
            self.push(tick);
        }
    }

    /// Latest observed tick for a symbol (survives flushes).
    pub fn latest(&self, symbol: &str) -> Option<Tick> {
        self.latest.get(symbol).map(|t| t.clone())
    }

    /// Drain every ring, preserving per-symbol arrival order.
    pub fn drain_all(&self) -> Vec<Tick> {
        let mut out = Vec::new();
        for mut entry in self.rings.iter_mut() {
            out.extend(entry.value_mut().drain(..));
        }
        out
    }

    pub fn buffered_count(&self) -> usize {
        self.rings.iter().map(|e| e.value().len()).sum()
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn tracked_symbols(&self) -> Vec<String> {
        self.latest.iter().map(|e| e.key().clone()).collect()
    }
}

/// Drains the tick rings to storage every second, on threshold, and once
/// more at shutdown.
pub struct TickFlusher {
    buffer: Arc<TickBuffer>,
    store: Store,
    interval: Duration,
}

impl TickFlusher {
    pub fn new(buffer: Arc<TickBuffer>, store: Store) -> Self {
        Self {
            buffer,
            store,
            interval: Duration::from_secs(1),
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.flush_once().await;
                }
                _ = self.buffer.flush_hint.notified() => {
                    self.flush_once().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Tick flusher shutting down, final flush");
                    self.flush_once().await;
                    return;
                }
            }
        }
    }

    async fn flush_once(&self) {
        let ticks = self.buffer.drain_all();
        if ticks.is_empty() {
            return;
        }
        let count = ticks.len();
        if let Err(e) = self.store.insert_ticks(&ticks).await {
            tracing::warn!("Tick flush of {} ticks failed: {}", count, e);
        } else {
            tracing::debug!("Flushed {} ticks", count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn tick(symbol: &str, bid: f64) -> Tick {
        Tick {
            symbol: symbol.to_string(),
            bid,
            ask: bid + 0.0001,
            spread: 0.0001,
            timestamp: Utc::now(),
            volume: 1.0,
        }
    }

    #[test]
    fn ring_drops_oldest_at_capacity() {
        let buffer = TickBuffer::new(3, 100);
        for i in 0..5 {
            buffer.push(tick("EURUSD", 1.0 + i as f64));
        }
        assert_eq!(buffer.buffered_count(), 3);
        assert_eq!(buffer.dropped_count(), 2);

        let drained = buffer.drain_all();
        // Oldest two were dropped
        assert_eq!(drained[0].bid, 3.0);
        assert_eq!(drained.len(), 3);
    }

    #[test]
    fn latest_survives_drain() {
        let buffer = TickBuffer::new(100, 100);
        buffer.push(tick("EURUSD", 1.085));
        buffer.push(tick("EURUSD", 1.086));
        buffer.drain_all();

        assert_eq!(buffer.buffered_count(), 0);
        let latest = buffer.latest("EURUSD").unwrap();
        assert_eq!(latest.bid, 1.086);
    }

    #[test]
    fn rings_are_per_symbol() {
        let buffer = TickBuffer::new(2, 100);
        for i in 0..3 {
            buffer.push(tick("EURUSD", 1.0 + i as f64));
            buffer.push(tick("GBPUSD", 2.0 + i as f64));
        }
        // Each symbol kept its own last 2
        assert_eq!(buffer.buffered_count(), 4);
        assert_eq!(buffer.dropped_count(), 2);
    }

    #[tokio::test]
    async fn flusher_writes_to_store() {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = Store::new(pool);
        store.init_tables().await.unwrap();

        let buffer = Arc::new(TickBuffer::new(100, 100));
        buffer.push(tick("EURUSD", 1.085));
        buffer.push(tick("EURUSD", 1.086));

        let flusher = TickFlusher::new(Arc::clone(&buffer), store.clone());
        flusher.flush_once().await;

        let latest = store.latest_tick("EURUSD").await.unwrap().unwrap();
        assert_eq!(latest.bid, 1.086);
        assert_eq!(buffer.buffered_count(), 0);
    }
}
