use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

/// SL-hit cooldowns per symbol. A paused symbol is skipped by the
/// auto-trader until its window passes.
pub struct SymbolPauseRegistry {
    paused_until: DashMap<String, DateTime<Utc>>,
}

impl Default for SymbolPauseRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolPauseRegistry {
    pub fn new() -> Self {
        Self {
            paused_until: DashMap::new(),
        }
    }

    pub fn pause(&self, symbol: &str, minutes: i64) {
        let until = Utc::now() + Duration::minutes(minutes);
        self.paused_until.insert(symbol.to_string(), until);
        tracing::warn!("Symbol {} paused until {}", symbol, until);
    }

    pub fn is_paused(&self, symbol: &str) -> bool {
        match self.paused_until.get(symbol).map(|until| *until) {
            Some(until) if until > Utc::now() => true,
            Some(_) => {
                self.paused_until.remove(symbol);
                false
            }
            None => false,
        }
    }

    pub fn paused_symbols(&self) -> Vec<(String, DateTime<Utc>)> {
        let now = Utc::now();
        self.paused_until
            .iter()
            .filter(|e| *e.value() > now)
            .map(|e| (e.key().clone(), *e.value()))
            .collect()
    }

    pub fn clear(&self, symbol: &str) {
        self.paused_until.remove(symbol);
    }
}
