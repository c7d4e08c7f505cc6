use serde::{Deserialize, Serialize};

/// Asset class a symbol belongs to. Drives TP/SL multipliers, trailing
/// distances and spread caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetClass {
    ForexMajor,
    ForexMinor,
    ForexExotic,
    Crypto,
    Metals,
    Indices,
    Commodities,
    Stocks,
}

/// Per-class risk profile. Multipliers apply to ATR; percentages apply to
/// the entry price.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ClassProfile {
    pub atr_tp_mult: f64,
    pub atr_sl_mult: f64,
    pub max_tp_percent: f64,
    pub min_sl_percent: f64,
    pub fallback_atr_percent: f64,
    pub trailing_mult: f64,
    /// Hard spread cap for the pre-execution gate, in price units.
    pub max_spread: f64,
}

const FOREX_MAJORS: [&str; 7] = [
    "EURUSD", "GBPUSD", "USDJPY", "USDCHF", "AUDUSD", "USDCAD", "NZDUSD",
];

const MAJOR_CURRENCIES: [&str; 8] = ["EUR", "GBP", "USD", "JPY", "CHF", "AUD", "CAD", "NZD"];

const METAL_PREFIXES: [&str; 4] = ["XAU", "XAG", "XPT", "XPD"];

const CRYPTO_PREFIXES: [&str; 6] = ["BTC", "ETH", "XRP", "LTC", "SOL", "DOGE"];

const INDEX_SYMBOLS: [&str; 8] = [
    "US30", "US500", "NAS100", "SPX500", "GER40", "UK100", "JPN225", "DAX",
];

const COMMODITY_PREFIXES: [&str; 5] = ["WTI", "BRENT", "XTI", "XBR", "NGAS"];

impl AssetClass {
    /// Resolve the class from a broker symbol name. Falls back to
    /// ForexMinor for unknown six-letter currency pairs and Stocks for
    /// anything else.
    pub fn classify(symbol: &str) -> AssetClass {
        let upper = symbol.to_uppercase();
        // Strip common broker suffixes like ".m" or "_i"
        let base: String = upper
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect();

        if METAL_PREFIXES.iter().any(|p| base.starts_with(p)) {
            return AssetClass::Metals;
        }
        if CRYPTO_PREFIXES.iter().any(|p| base.starts_with(p)) {
            return AssetClass::Crypto;
        }
        if INDEX_SYMBOLS.iter().any(|s| base.starts_with(s)) {
            return AssetClass::Indices;
        }
        if COMMODITY_PREFIXES.iter().any(|p| base.starts_with(p)) {
            return AssetClass::Commodities;
        }
        if FOREX_MAJORS.contains(&base.as_str()) {
            return AssetClass::ForexMajor;
        }
        if base.len() == 6 {
            let (a, b) = base.split_at(3);
            let a_major = MAJOR_CURRENCIES.contains(&a);
            let b_major = MAJOR_CURRENCIES.contains(&b);
            if a_major && b_major {
                return AssetClass::ForexMinor;
            }
            if a_major || b_major {
                return AssetClass::ForexExotic;
            }
        }
        AssetClass::Stocks
    }

    pub fn profile(&self) -> ClassProfile {
        match self {
            AssetClass::ForexMajor => ClassProfile {
                atr_tp_mult: 2.0,
                atr_sl_mult: 1.2,
                max_tp_percent: 1.0,
                min_sl_percent: 0.15,
                fallback_atr_percent: 0.08,
                trailing_mult: 0.8,
                max_spread: 0.0003, // 3 pips
            },
            AssetClass::ForexMinor => ClassProfile {
                atr_tp_mult: 2.5,
                atr_sl_mult: 1.3,
                max_tp_percent: 1.2,
                min_sl_percent: 0.20,
                fallback_atr_percent: 0.12,
                trailing_mult: 0.9,
                max_spread: 0.0005, // 5 pips
            },
            AssetClass::ForexExotic => ClassProfile {
                atr_tp_mult: 3.0,
                atr_sl_mult: 1.5,
                max_tp_percent: 2.0,
                min_sl_percent: 0.50,
                fallback_atr_percent: 0.20,
                trailing_mult: 1.0,
                max_spread: 0.0010, // 10 pips
            },
            AssetClass::Crypto => ClassProfile {
                atr_tp_mult: 1.8,
                atr_sl_mult: 1.0,
                max_tp_percent: 5.0,
                min_sl_percent: 1.00,
                fallback_atr_percent: 2.00,
                trailing_mult: 0.7,
                max_spread: 50.0,
            },
            AssetClass::Metals => ClassProfile {
                atr_tp_mult: 2.2,
                atr_sl_mult: 1.2,
                max_tp_percent: 2.0,
                min_sl_percent: 0.50,
                fallback_atr_percent: 0.80,
                trailing_mult: 0.8,
                max_spread: 0.50,
            },
            AssetClass::Indices => ClassProfile {
                atr_tp_mult: 2.0,
                atr_sl_mult: 1.2,
                max_tp_percent: 1.5,
                min_sl_percent: 0.30,
                fallback_atr_percent: 0.60,
                trailing_mult: 0.9,
                max_spread: 5.0,
            },
            AssetClass::Commodities => ClassProfile {
                atr_tp_mult: 2.5,
                atr_sl_mult: 1.5,
                max_tp_percent: 3.0,
                min_sl_percent: 0.80,
                fallback_atr_percent: 1.50,
                trailing_mult: 1.0,
                max_spread: 0.10,
            },
            AssetClass::Stocks => ClassProfile {
                atr_tp_mult: 2.0,
                atr_sl_mult: 1.3,
                max_tp_percent: 2.0,
                min_sl_percent: 0.50,
                fallback_atr_percent: 1.00,
                trailing_mult: 0.9,
                max_spread: 0.50,
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AssetClass::ForexMajor => "FOREX_MAJOR",
            AssetClass::ForexMinor => "FOREX_MINOR",
            AssetClass::ForexExotic => "FOREX_EXOTIC",
            AssetClass::Crypto => "CRYPTO",
            AssetClass::Metals => "METALS",
            AssetClass::Indices => "INDICES",
            AssetClass::Commodities => "COMMODITIES",
            AssetClass::Stocks => "STOCKS",
        }
    }

    /// The currencies a symbol exposes, for correlation and news-pause
    /// matching. Non-FX symbols report their base asset only.
    pub fn currencies_of(symbol: &str) -> Vec<String> {
        let upper: String = symbol
            .to_uppercase()
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect();
        match AssetClass::classify(&upper) {
            AssetClass::ForexMajor | AssetClass::ForexMinor | AssetClass::ForexExotic
                if upper.len() >= 6 =>
            {
                vec![upper[..3].to_string(), upper[3..6].to_string()]
            }
            AssetClass::Metals | AssetClass::Crypto if upper.len() >= 6 => {
                vec![upper[..3].to_string(), upper[3..6].to_string()]
            }
            _ => vec![upper],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_majors_and_minors() {
        assert_eq!(AssetClass::classify("EURUSD"), AssetClass::ForexMajor);
        assert_eq!(AssetClass::classify("eurusd"), AssetClass::ForexMajor);
        assert_eq!(AssetClass::classify("EURGBP"), AssetClass::ForexMinor);
        assert_eq!(AssetClass::classify("USDTRY"), AssetClass::ForexExotic);
    }

    #[test]
    fn classify_special_assets() {
        assert_eq!(AssetClass::classify("XAUUSD"), AssetClass::Metals);
        assert_eq!(AssetClass::classify("BTCUSD"), AssetClass::Crypto);
        assert_eq!(AssetClass::classify("US30"), AssetClass::Indices);
        assert_eq!(AssetClass::classify("WTIUSD"), AssetClass::Commodities);
        assert_eq!(AssetClass::classify("AAPL"), AssetClass::Stocks);
    }

    #[test]
    fn classify_with_broker_suffix() {
        assert_eq!(AssetClass::classify("EURUSD.m"), AssetClass::ForexMajor);
        assert_eq!(AssetClass::classify("XAUUSD_i"), AssetClass::Metals);
    }

    #[test]
    fn profile_table_matches_defaults() {
        let p = AssetClass::ForexMajor.profile();
        assert_eq!(p.atr_tp_mult, 2.0);
        assert_eq!(p.atr_sl_mult, 1.2);
        let c = AssetClass::Crypto.profile();
        assert_eq!(c.max_tp_percent, 5.0);
        assert_eq!(c.trailing_mult, 0.7);
    }

    #[test]
    fn currencies_extraction() {
        assert_eq!(AssetClass::currencies_of("EURUSD"), vec!["EUR", "USD"]);
        assert_eq!(AssetClass::currencies_of("XAUUSD"), vec!["XAU", "USD"]);
        assert_eq!(AssetClass::currencies_of("US30"), vec!["US30"]);
    }
}
