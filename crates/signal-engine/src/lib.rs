mod cache;
mod engine;
mod ensemble;
mod mtf;
mod votes;
mod weights;

pub use cache::IndicatorCache;
pub use engine::{RawEvaluation, SignalEngine};
pub use ensemble::{validate_ensemble, EnsembleDecision};
pub use mtf::{higher_timeframe_trend, HtfTrend};
pub use votes::{collect_votes, IndicatorVote};
pub use weights::{WeightBook, WeightTable};
