mod exit_metrics;
mod monitor;
mod tpsl;
mod trailing;

pub use exit_metrics::{close_update_for, resolve_close_reason};
pub use monitor::PositionMonitor;
pub use tpsl::{TpSlCalculator, TpSlLevels};
pub use trailing::{TrailingDecision, TrailingEngine, TrailingStage};
