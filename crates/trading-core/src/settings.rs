use serde::{Deserialize, Serialize};

/// Recognized global options. Stored as a singleton row; env vars provide
/// the initial values and the admin surface can override at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalSettings {
    pub risk_per_trade_percent: f64,
    pub max_positions: i32,
    pub max_positions_per_symbol: i32,
    pub max_daily_loss_percent: f64,
    pub max_total_drawdown_percent: f64,
    pub min_signal_confidence: f64,
    pub min_autotrade_confidence: f64,
    pub signal_max_age_minutes: i64,
    pub sl_cooldown_minutes: i64,
    pub autotrade_enabled: bool,
    pub dynamic_tp_enabled: bool,
    pub tp_extension_trigger_percent: f64,
    pub tp_extension_multiplier: f64,
    pub trade_timeout_hours: i64,
    pub trade_timeout_action: TimeoutAction,
    pub heartbeat_interval_seconds: u64,
    pub command_poll_interval_ms: u64,
    /// Trailing stage triggers as percent-of-TP progress.
    pub trailing_stage_triggers: [f64; 4],
    pub mtf_confluence_enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeoutAction {
    Close,
    Alert,
    Ignore,
}

impl TimeoutAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeoutAction::Close => "close",
            TimeoutAction::Alert => "alert",
            TimeoutAction::Ignore => "ignore",
        }
    }

    pub fn parse(s: &str) -> Option<TimeoutAction> {
        match s {
            "close" => Some(TimeoutAction::Close),
            "alert" => Some(TimeoutAction::Alert),
            "ignore" => Some(TimeoutAction::Ignore),
            _ => None,
        }
    }
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            risk_per_trade_percent: 1.0,
            max_positions: 10,
            max_positions_per_symbol: 2,
            max_daily_loss_percent: 5.0,
            max_total_drawdown_percent: 20.0,
            min_signal_confidence: 60.0,
            min_autotrade_confidence: 65.0,
            signal_max_age_minutes: 60,
            sl_cooldown_minutes: 60,
            autotrade_enabled: true,
            dynamic_tp_enabled: true,
            tp_extension_trigger_percent: 80.0,
            tp_extension_multiplier: 0.5,
            trade_timeout_hours: 24,
            trade_timeout_action: TimeoutAction::Close,
            heartbeat_interval_seconds: 10,
            command_poll_interval_ms: 500,
            trailing_stage_triggers: [20.0, 40.0, 60.0, 80.0],
            mtf_confluence_enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let s = GlobalSettings::default();
        assert_eq!(s.risk_per_trade_percent, 1.0);
        assert_eq!(s.max_positions, 10);
        assert_eq!(s.max_positions_per_symbol, 2);
        assert_eq!(s.min_autotrade_confidence, 65.0);
        assert_eq!(s.trade_timeout_action, TimeoutAction::Close);
        assert_eq!(s.trailing_stage_triggers, [20.0, 40.0, 60.0, 80.0]);
    }
}
