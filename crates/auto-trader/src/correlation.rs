use trading_core::{Trade, TradeDirection, TradeStatus};

/// Pre-declared correlated symbol groups. Exposure is counted inside the
/// group sharing the candidate symbol, same directional bias only.
const CORRELATED_GROUPS: &[&[&str]] = &[
    &["EURUSD", "GBPUSD", "EURGBP", "EURCHF", "USDCHF"],
    &["AUDUSD", "NZDUSD", "AUDNZD"],
    &["USDJPY", "EURJPY", "GBPJPY"],
    &["XAUUSD", "XAGUSD"],
    &["US30", "US500", "NAS100", "SPX500"],
    &["BTCUSD", "ETHUSD"],
    &["WTIUSD", "BRENTUSD", "USDCAD"],
];

fn group_of(symbol: &str) -> Option<&'static [&'static str]> {
    let upper = symbol.to_uppercase();
    CORRELATED_GROUPS
        .iter()
        .find(|group| group.iter().any(|s| upper.starts_with(s)))
        .copied()
}

/// Open positions correlated with `symbol` in the same direction.
pub fn correlated_exposure(open_trades: &[Trade], symbol: &str, direction: TradeDirection) -> usize {
    let group = match group_of(symbol) {
        Some(g) => g,
        None => return 0,
    };

    open_trades
        .iter()
        .filter(|t| t.status == TradeStatus::Open && t.direction == direction)
        .filter(|t| {
            let upper = t.symbol.to_uppercase();
            group.iter().any(|s| upper.starts_with(s))
        })
        .count()
}
