use anyhow::Result;
use serde::Serialize;
use storage::Store;
use trading_core::{AssetClass, BrokerSymbolInfo, TradeDirection};

/// Computed protective levels for a new position.
#[derive(Debug, Clone, Serialize)]
pub struct TpSlLevels {
    pub tp: f64,
    pub sl: f64,
    pub tp_reason: String,
    pub sl_reason: String,
    pub risk_reward: f64,
    pub trailing_distance_pct: f64,
    pub tp_distance_points: f64,
    pub sl_distance_points: f64,
    pub broker_stops_level: i32,
}

/// Initial TP/SL from the asset-class profile, ATR and broker constraints.
/// Per-symbol overrides win over class defaults.
#[derive(Clone)]
pub struct TpSlCalculator {
    store: Store,
}

impl TpSlCalculator {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Returns None when no valid levels exist within the class caps;
    /// the signal is rejected rather than attached with bad levels.
    pub async fn calculate(
        &self,
        account_id: i64,
        symbol: &str,
        direction: TradeDirection,
        entry: f64,
        atr: Option<f64>,
    ) -> Result<Option<TpSlLevels>> {
        if entry <= 0.0 {
            return Ok(None);
        }

        let class = AssetClass::classify(symbol);
        let profile = class.profile();
        let broker = self
            .store
            .get_broker_symbol(account_id, symbol)
            .await?
            .unwrap_or_else(|| BrokerSymbolInfo::fallback(account_id, symbol));
        let overrides = self.store.get_symbol_override(symbol).await?;

        let tp_mult_base = overrides
            .as_ref()
            .and_then(|o| o.tp_atr_mult)
            .unwrap_or(profile.atr_tp_mult);
        let sl_mult_base = overrides
            .as_ref()
            .and_then(|o| o.sl_atr_mult)
            .unwrap_or(profile.atr_sl_mult);
        let trailing_mult = overrides
            .as_ref()
            .and_then(|o| o.trailing_mult)
            .unwrap_or(profile.trailing_mult);

        // Volatility basis: ATR when available, else a class fallback
        // fraction of the entry price.
        let (range, range_source) = match atr {
            Some(v) if v > 0.0 => (v, "ATR"),
            _ => (entry * profile.fallback_atr_percent / 100.0, "fallback"),
        };

        // BUY gets a wider target and tighter stop than SELL.
        let (tp_mult, sl_mult, min_rr) = match direction {
            TradeDirection::Buy => (tp_mult_base * 1.2, sl_mult_base * 0.9, 2.0),
            TradeDirection::Sell => (tp_mult_base, sl_mult_base, 1.5),
        };

        let sign = direction.sign();
        let mut tp_distance = range * tp_mult;
        // The class floor keeps the stop out of spread noise on quiet
        // sessions where ATR alone would put it too close.
        let sl_floor = entry * profile.min_sl_percent / 100.0;
        let sl_distance = (range * sl_mult).max(sl_floor);

        // Widen TP to reach the minimum R:R, within the class TP cap.
        if sl_distance > 0.0 && tp_distance / sl_distance < min_rr {
            tp_distance = sl_distance * min_rr;
        }
        let max_tp_distance = entry * profile.max_tp_percent / 100.0;
        if tp_distance > max_tp_distance {
            tp_distance = max_tp_distance;
        }

        let mut tp = broker.round_price(entry + sign * tp_distance);
        let mut sl = broker.round_price(entry - sign * sl_distance);

        // Enforce the broker's minimum stop distance on both levels.
        let min_distance = broker.min_stop_distance();
        let mut tp_reason = format!("{} x{:.2} ({})", range_source, tp_mult, class.name());
        let mut sl_reason = format!("{} x{:.2} ({})", range_source, sl_mult, class.name());

        if (tp - entry).abs() < min_distance {
            tp = broker.round_price(entry + sign * min_distance);
            tp_reason.push_str(", widened to broker stops level");
            tracing::debug!("{}: TP widened to broker stops level", symbol);
        }
        if (sl - entry).abs() < min_distance {
            sl = broker.round_price(entry - sign * min_distance);
            sl_reason.push_str(", widened to broker stops level");
            tracing::debug!("{}: SL widened to broker stops level", symbol);
        }

        let tp_distance_final = (tp - entry).abs();
        let sl_distance_final = (sl - entry).abs();

        // Reject when broker adjustments pushed the levels out of the
        // class envelope.
        if tp_distance_final > entry * profile.max_tp_percent / 100.0 + 1e-9 {
            tracing::warn!(
                "{}: TP distance {:.5} exceeds class cap, rejecting levels",
                symbol,
                tp_distance_final
            );
            return Ok(None);
        }
        // One point of tolerance absorbs the digit rounding.
        if sl_distance_final + broker.point_value < sl_floor {
            tracing::warn!(
                "{}: SL distance {:.5} under class minimum, rejecting levels",
                symbol,
                sl_distance_final
            );
            return Ok(None);
        }

        let risk_reward = if sl_distance_final > 0.0 {
            tp_distance_final / sl_distance_final
        } else {
            0.0
        };

        Ok(Some(TpSlLevels {
            tp,
            sl,
            tp_reason,
            sl_reason,
            risk_reward,
            trailing_distance_pct: trailing_mult,
            tp_distance_points: tp_distance_final / broker.point_value,
            sl_distance_points: sl_distance_final / broker.point_value,
            broker_stops_level: broker.stops_level,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::SymbolOverride;

    async fn setup() -> TpSlCalculator {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = Store::new(pool);
        store.init_tables().await.unwrap();
        TpSlCalculator::new(store)
    }

    #[tokio::test]
    async fn eurusd_buy_levels_from_atr() {
        let calc = setup().await;

        // FOREX_MAJOR BUY: tp = 2.0*1.2 = 2.4x ATR, sl = 1.2*0.9 = 1.08x ATR
        let levels = calc
            .calculate(1, "EURUSD", TradeDirection::Buy, 1.08500, Some(0.00180))
            .await
            .unwrap()
            .expect("levels");

        // sl distance = 0.0018 * 1.08 = 0.001944 (above the 0.15% floor)
        // tp distance = 0.0018 * 2.4 = 0.00432, R:R 2.22
        assert!((levels.sl - 1.08306).abs() < 0.00002, "sl = {}", levels.sl);
        assert!((levels.tp - 1.08932).abs() < 0.00002, "tp = {}", levels.tp);
        assert!(levels.risk_reward >= 2.0 - 0.01);
        assert_eq!(levels.broker_stops_level, 10);
    }

    #[tokio::test]
    async fn buy_tp_widened_to_minimum_rr() {
        let calc = setup().await;

        // A small ATR puts the SL on the class floor (0.15% = 0.0016275);
        // the raw 2.4x TP (0.00192) is then widened to 2.0 R:R.
        let levels = calc
            .calculate(1, "EURUSD", TradeDirection::Buy, 1.08500, Some(0.00080))
            .await
            .unwrap()
            .expect("levels");

        assert!((levels.sl - 1.08337).abs() < 0.00002, "sl = {}", levels.sl);
        assert!((levels.tp - 1.08826).abs() < 0.00002, "tp = {}", levels.tp);
        assert!(levels.risk_reward >= 2.0 - 0.01);
    }

    #[tokio::test]
    async fn sell_uses_base_multipliers() {
        let calc = setup().await;

        let levels = calc
            .calculate(1, "EURUSD", TradeDirection::Sell, 1.08500, Some(0.00180))
            .await
            .unwrap()
            .expect("levels");

        // SELL mirrors below/above entry
        assert!(levels.tp < 1.08500);
        assert!(levels.sl > 1.08500);
        assert!(levels.risk_reward >= 1.5 - 0.01);
    }

    #[tokio::test]
    async fn fallback_range_without_atr() {
        let calc = setup().await;

        let levels = calc
            .calculate(1, "EURUSD", TradeDirection::Buy, 1.08500, None)
            .await
            .unwrap()
            .expect("levels");

        assert!(levels.tp_reason.contains("fallback"));
        assert!(levels.tp > 1.08500);
        assert!(levels.sl < 1.08500);
        // The fallback basis alone is under the class floor; the floor wins
        assert!(1.08500 - levels.sl >= 1.08500 * 0.15 / 100.0 - 0.00001);
    }

    #[tokio::test]
    async fn class_floor_applies_to_tiny_atr() {
        let calc = setup().await;

        let levels = calc
            .calculate(1, "EURUSD", TradeDirection::Buy, 1.08500, Some(0.0000005))
            .await
            .unwrap()
            .expect("levels");

        // SL distance never collapses below 0.15% of entry
        assert!(1.08500 - levels.sl >= 1.08500 * 0.15 / 100.0 - 0.00001);
    }

    #[tokio::test]
    async fn symbol_override_wins_over_class_profile() {
        let calc = setup().await;
        calc.store
            .upsert_symbol_override(&SymbolOverride {
                symbol: "XAUUSD".to_string(),
                tp_atr_mult: None,
                sl_atr_mult: None,
                trailing_mult: Some(0.7),
                min_confidence: Some(70.0),
            })
            .await
            .unwrap();

        let levels = calc
            .calculate(1, "XAUUSD", TradeDirection::Buy, 2400.0, Some(8.0))
            .await
            .unwrap()
            .expect("levels");

        // METALS default trailing is 0.8; the override pins 0.7
        assert!((levels.trailing_distance_pct - 0.7).abs() < 1e-9);
    }
}
