use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use trading_core::{BrokerSymbolInfo, Trade, TradeDirection};

/// Trailing stages in activation order. A trade only moves forward through
/// them, even when price retraces below an earlier trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TrailingStage {
    BreakEven,
    Partial,
    Aggressive,
    NearTpLock,
}

impl TrailingStage {
    pub fn name(&self) -> &'static str {
        match self {
            TrailingStage::BreakEven => "break_even",
            TrailingStage::Partial => "partial_trailing",
            TrailingStage::Aggressive => "aggressive_trailing",
            TrailingStage::NearTpLock => "near_tp_lock",
        }
    }

    /// Fraction of the remaining distance to TP left open below price.
    fn lock_fraction(&self) -> f64 {
        match self {
            TrailingStage::BreakEven => 0.0, // handled separately
            TrailingStage::Partial => 0.30,
            TrailingStage::Aggressive => 0.15,
            TrailingStage::NearTpLock => 0.10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrailingDecision {
    pub stage: TrailingStage,
    pub new_sl: f64,
    pub progress_percent: f64,
}

/// Multi-stage trailing stop. The stop ratchets toward TP and never moves
/// back toward entry; moves are rate-limited per trade.
pub struct TrailingEngine {
    triggers: [f64; 4],
    min_move_interval: Duration,
    last_move: DashMap<i64, DateTime<Utc>>,
    reached_stage: DashMap<i64, TrailingStage>,
}

impl TrailingEngine {
    pub fn new(triggers: [f64; 4], rate_limit_seconds: i64) -> Self {
        Self {
            triggers,
            min_move_interval: Duration::seconds(rate_limit_seconds),
            last_move: DashMap::new(),
            reached_stage: DashMap::new(),
        }
    }

    /// Progress toward TP as a percentage, sign-adjusted for direction.
    pub fn progress_percent(trade: &Trade, price: f64) -> Option<f64> {
        let tp = trade.tp?;
        let span = (tp - trade.open_price) * trade.direction.sign();
        if span <= 0.0 {
            return None;
        }
        let gained = (price - trade.open_price) * trade.direction.sign();
        Some(gained / span * 100.0)
    }

    fn stage_for(&self, progress: f64) -> Option<TrailingStage> {
        if progress >= self.triggers[3] {
            Some(TrailingStage::NearTpLock)
        } else if progress >= self.triggers[2] {
            Some(TrailingStage::Aggressive)
        } else if progress >= self.triggers[1] {
            Some(TrailingStage::Partial)
        } else if progress >= self.triggers[0] {
            Some(TrailingStage::BreakEven)
        } else {
            None
        }
    }

    /// Evaluate one tick against one open trade. Returns a decision only
    /// when the stop should actually move.
    pub fn evaluate(
        &self,
        trade: &Trade,
        price: f64,
        spread: f64,
        broker: &BrokerSymbolInfo,
        now: DateTime<Utc>,
    ) -> Option<TrailingDecision> {
        let tp = trade.tp?;
        let progress = Self::progress_percent(trade, price)?;

        let mut stage = self.stage_for(progress)?;

        // Stage floor: once reached, a stage is never left.
        if let Some(prev) = self.reached_stage.get(&trade.id) {
            stage = stage.max(*prev);
        }

        // Rate limit: one move per trade per interval.
        if let Some(last) = self.last_move.get(&trade.id) {
            if now - *last < self.min_move_interval {
                return None;
            }
        }

        let sign = trade.direction.sign();
        let candidate = match stage {
            TrailingStage::BreakEven => trade.open_price + sign * spread * 1.3,
            _ => {
                let remaining = (tp - price) * sign;
                if remaining <= 0.0 {
                    // Price at or past TP; lock just under it.
                    price - sign * spread
                } else {
                    price - sign * remaining * stage.lock_fraction()
                }
            }
        };

        // Respect the broker's minimum distance from the current price.
        let min_distance = broker.min_stop_distance();
        let clamped = match trade.direction {
            TradeDirection::Buy => candidate.min(price - min_distance),
            TradeDirection::Sell => candidate.max(price + min_distance),
        };
        let new_sl = broker.round_price(clamped);

        // Only move in the profit direction.
        let improves = match (trade.sl, trade.direction) {
            (Some(sl), TradeDirection::Buy) => new_sl > sl,
            (Some(sl), TradeDirection::Sell) => new_sl < sl,
            (None, _) => true,
        };
        if !improves {
            return None;
        }

        self.reached_stage.insert(trade.id, stage);
        self.last_move.insert(trade.id, now);

        Some(TrailingDecision {
            stage,
            new_sl,
            progress_percent: progress,
        })
    }

    /// Forget per-trade state after a close.
    pub fn forget(&self, trade_id: i64) {
        self.last_move.remove(&trade_id);
        self.reached_stage.remove(&trade_id);
    }
}
