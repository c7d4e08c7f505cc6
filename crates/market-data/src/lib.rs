mod buffer;
mod coverage;
mod spread;

pub use buffer::{TickBuffer, TickFlusher};
pub use coverage::{CoverageReport, MarketDataService};
pub use spread::SpreadStats;
