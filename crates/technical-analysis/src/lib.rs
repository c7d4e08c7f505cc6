pub mod indicators;
pub mod patterns;
pub mod snapshot;

#[cfg(test)]
#[path = "indicators_tests.rs"]
mod indicators_tests;

pub use indicators::*;
pub use patterns::{detect_patterns, CandlePattern, PatternMatch};
pub use snapshot::IndicatorSnapshot;
