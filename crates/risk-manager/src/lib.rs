mod breaker;
mod pause;
mod workers;

#[cfg(test)]
#[path = "tests.rs"]
mod risk_tests;

pub use breaker::{BreakerState, CircuitBreaker};
pub use pause::SymbolPauseRegistry;
pub use workers::{
    note_sl_hit, refresh_symbol_performance, run_drawdown_worker, run_news_pause_worker,
    run_retention_worker, run_sl_hit_worker, run_strategy_validation_worker, run_timeout_worker,
    symbol_in_news_pause,
};
