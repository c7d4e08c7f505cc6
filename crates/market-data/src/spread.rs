use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

/// Rolling spread averages per symbol. Samples outside the window fall off
/// as new ones arrive, so the average always reflects the trailing window.
pub struct SpreadStats {
    window: Duration,
    samples: DashMap<String, VecDeque<(DateTime<Utc>, f64)>>,
}

impl SpreadStats {
    pub fn new(window_minutes: i64) -> Self {
        Self {
            window: Duration::minutes(window_minutes),
            samples: DashMap::new(),
        }
    }

    pub fn record(&self, symbol: &str, spread: f64, at: DateTime<Utc>) {
        let mut entry = self.samples.entry(symbol.to_string()).or_default();
        entry.push_back((at, spread));

        let cutoff = at - self.window;
        while matches!(entry.front(), Some((ts, _)) if *ts < cutoff) {
            entry.pop_front();
        }
    }

    /// Rolling average spread, None until a sample exists in the window.
    pub fn average(&self, symbol: &str) -> Option<f64> {
        let entry = self.samples.get(symbol)?;
        let cutoff = Utc::now() - self.window;
        let mut sum = 0.0;
        let mut n = 0usize;
        for (ts, spread) in entry.iter() {
            if *ts >= cutoff {
                sum += spread;
                n += 1;
            }
        }
        if n == 0 {
            None
        } else {
            Some(sum / n as f64)
        }
    }

    pub fn sample_count(&self, symbol: &str) -> usize {
        self.samples.get(symbol).map(|e| e.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_over_window() {
        let stats = SpreadStats::new(60);
        let now = Utc::now();
        stats.record("EURUSD", 0.0001, now - Duration::minutes(5));
        stats.record("EURUSD", 0.0003, now);

        let avg = stats.average("EURUSD").unwrap();
        assert!((avg - 0.0002).abs() < 1e-9);
    }

    #[test]
    fn old_samples_fall_off() {
        let stats = SpreadStats::new(60);
        let now = Utc::now();
        stats.record("EURUSD", 0.0100, now - Duration::minutes(90));
        stats.record("EURUSD", 0.0002, now);

        // The 90-minute-old sample was evicted on the second record
        let avg = stats.average("EURUSD").unwrap();
        assert!((avg - 0.0002).abs() < 1e-9);
        assert_eq!(stats.sample_count("EURUSD"), 1);
    }

    #[test]
    fn unknown_symbol_has_no_average() {
        let stats = SpreadStats::new(60);
        assert!(stats.average("GBPUSD").is_none());
    }
}
