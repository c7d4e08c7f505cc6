use std::collections::HashMap;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use trading_core::AssetClass;

/// Per-indicator ensemble weights for one asset class. The values come from
/// offline backtests and are treated strictly as input data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightTable {
    pub rsi: f64,
    pub macd: f64,
    pub bollinger: f64,
    pub ema: f64,
    pub adx: f64,
    pub stochastic: f64,
    pub obv: f64,
    pub vwap: f64,
    pub ichimoku: f64,
    pub supertrend: f64,
    pub pattern: f64,
}

impl Default for WeightTable {
    fn default() -> Self {
        Self {
            rsi: 1.0,
            macd: 1.2,
            bollinger: 0.8,
            ema: 1.0,
            adx: 1.1,
            stochastic: 0.8,
            obv: 0.5,
            vwap: 0.4,
            ichimoku: 0.9,
            supertrend: 1.1,
            pattern: 0.7,
        }
    }
}

/// Weight tables per asset class, loadable from a JSON artifact. Classes
/// absent from the artifact fall back to the compiled-in defaults.
#[derive(Debug, Clone, Default)]
pub struct WeightBook {
    tables: HashMap<String, WeightTable>,
}

impl WeightBook {
    pub fn from_json_file(path: &str) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading weights artifact {}", path))?;
        let tables: HashMap<String, WeightTable> =
            serde_json::from_str(&raw).context("parsing weights artifact")?;
        tracing::info!("Loaded ensemble weights for {} asset classes", tables.len());
        Ok(Self { tables })
    }

    pub fn for_class(&self, class: AssetClass) -> WeightTable {
        self.tables
            .get(class.name())
            .cloned()
            .unwrap_or_else(|| match class {
                // Trend followers carry more weight on trending assets.
                AssetClass::Crypto | AssetClass::Indices => WeightTable {
                    supertrend: 1.3,
                    adx: 1.2,
                    vwap: 0.6,
                    ..WeightTable::default()
                },
                // Mean reversion reads better on range-bound FX.
                AssetClass::ForexMajor | AssetClass::ForexMinor => WeightTable {
                    bollinger: 1.0,
                    stochastic: 0.9,
                    ..WeightTable::default()
                },
                _ => WeightTable::default(),
            })
    }
}
