use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use position_manager::TpSlCalculator;
use storage::{decision, SignalUpsertOutcome, Store};
use technical_analysis::IndicatorSnapshot;
use trading_core::{
    AssetClass, DecisionImpact, GlobalSettings, SignalType, Timeframe,
};

use crate::cache::IndicatorCache;
use crate::ensemble::validate_ensemble;
use crate::mtf::higher_timeframe_trend;
use crate::votes::collect_votes;
use crate::weights::WeightBook;

/// Confidence floor below which generated signals are discarded outright.
const MIN_GENERATION_CONFIDENCE: f64 = 50.0;

/// Bars requested per evaluation; enough history for EMA(200) plus Ichimoku.
const EVALUATION_BARS: i64 = 250;

/// Minimum bars before an evaluation is attempted at all.
const MIN_BARS: usize = 60;

/// Ensemble result before persistence, also used by the strategy
/// validation worker to re-check open trades.
#[derive(Debug, Clone)]
pub struct RawEvaluation {
    pub signal_type: SignalType,
    pub confidence: f64,
    pub entry_price: f64,
    pub atr: Option<f64>,
    pub has_entry_pattern: bool,
    pub snapshot: serde_json::Value,
}

/// Per-(account, symbol, timeframe) signal generation.
pub struct SignalEngine {
    store: Store,
    cache: IndicatorCache,
    weights: WeightBook,
    tpsl: TpSlCalculator,
    settings: GlobalSettings,
    last_eval: DashMap<(i64, String, Timeframe), DateTime<Utc>>,
    throttle: Duration,
}

impl SignalEngine {
    pub fn new(store: Store, weights: WeightBook, settings: GlobalSettings) -> Self {
        let tpsl = TpSlCalculator::new(store.clone());
        Self {
            store,
            cache: IndicatorCache::new(),
            weights,
            tpsl,
            settings,
            last_eval: DashMap::new(),
            throttle: Duration::seconds(5),
        }
    }

    /// Tick-driven entry point, throttled per key so a fast feed cannot
    /// spin the pipeline.
    pub async fn on_tick(
        &self,
        account_id: i64,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<Option<SignalUpsertOutcome>> {
        let key = (account_id, symbol.to_string(), timeframe);
        let now = Utc::now();
        if let Some(last) = self.last_eval.get(&key) {
            if now - *last < self.throttle {
                return Ok(None);
            }
        }
        self.last_eval.insert(key, now);
        self.evaluate(account_id, symbol, timeframe).await
    }

    /// Full pipeline evaluation: indicators, votes, ensemble, confluence,
    /// TP/SL attach, threshold and atomic upsert.
    pub async fn evaluate(
        &self,
        account_id: i64,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<Option<SignalUpsertOutcome>> {
        let raw = match self.evaluate_raw(symbol, timeframe).await? {
            Some(r) => r,
            None => return Ok(None),
        };

        // Multi-timeframe confluence: the higher timeframe must not
        // contradict.
        if self.settings.mtf_confluence_enabled {
            if let Some(higher) = timeframe.higher() {
                if let Some(htf_snap) = self.snapshot_for(symbol, higher).await? {
                    let trend = higher_timeframe_trend(&htf_snap);
                    if trend.conflicts_with(raw.signal_type) {
                        tracing::info!(
                            "{} {} {} dropped: {} conflict on {}",
                            symbol,
                            timeframe.name(),
                            raw.signal_type.as_str(),
                            format!("{:?}", trend),
                            higher.name()
                        );
                        self.store
                            .record_decision(&decision(
                                account_id,
                                "MTF_CONFLICT",
                                Some(symbol),
                                false,
                                &format!(
                                    "{} {} signal contradicted by {} trend",
                                    timeframe.name(),
                                    raw.signal_type.as_str(),
                                    higher.name()
                                ),
                                DecisionImpact::Low,
                            ))
                            .await?;
                        return Ok(None);
                    }
                }
            }
        }

        // Attach protective levels; a rejection kills the signal.
        let direction = match raw.signal_type {
            SignalType::Buy => trading_core::TradeDirection::Buy,
            SignalType::Sell => trading_core::TradeDirection::Sell,
            _ => return Ok(None),
        };
        let levels = match self
            .tpsl
            .calculate(account_id, symbol, direction, raw.entry_price, raw.atr)
            .await?
        {
            Some(l) => l,
            None => {
                self.store
                    .record_decision(&decision(
                        account_id,
                        "SIGNAL_REJECTED",
                        Some(symbol),
                        false,
                        "No valid TP/SL inside asset-class limits",
                        DecisionImpact::Low,
                    ))
                    .await?;
                return Ok(None);
            }
        };

        if raw.confidence < MIN_GENERATION_CONFIDENCE {
            tracing::debug!(
                "{} {} confidence {:.1} below generation floor",
                symbol,
                timeframe.name(),
                raw.confidence
            );
            return Ok(None);
        }

        let outcome = self
            .store
            .upsert_signal(
                account_id,
                symbol,
                timeframe,
                raw.signal_type,
                raw.confidence,
                raw.entry_price,
                Some(levels.sl),
                Some(levels.tp),
                &raw.snapshot,
            )
            .await?;

        match &outcome {
            SignalUpsertOutcome::Created(id) | SignalUpsertOutcome::Replaced(id) => {
                tracing::info!(
                    "signal_created: {} {} {} @ {:.1}% (id {}, tp {:.5}, sl {:.5}, rr {:.2})",
                    symbol,
                    timeframe.name(),
                    raw.signal_type.as_str(),
                    raw.confidence,
                    id,
                    levels.tp,
                    levels.sl,
                    levels.risk_reward
                );
            }
            SignalUpsertOutcome::Kept(_) => {}
        }

        Ok(Some(outcome))
    }

    /// Votes-and-ensemble only, no persistence. The strategy validation
    /// worker runs this to re-check the thesis behind an open trade.
    pub async fn evaluate_raw(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<Option<RawEvaluation>> {
        let bars = self.store.recent_bars(symbol, timeframe, EVALUATION_BARS).await?;
        if bars.len() < MIN_BARS {
            tracing::debug!(
                "{} {}: only {} bars, need {}",
                symbol,
                timeframe.name(),
                bars.len(),
                MIN_BARS
            );
            return Ok(None);
        }

        let snap = match self.cache.snapshot_for(symbol, timeframe, &bars).await {
            Some(s) => s,
            None => return Ok(None),
        };
        let patterns = IndicatorSnapshot::patterns(&bars);

        let weights = self.weights.for_class(AssetClass::classify(symbol));
        let votes = collect_votes(&snap, &patterns, &weights);

        let ensemble = match validate_ensemble(&votes) {
            Some(e) => e,
            None => return Ok(None),
        };

        let wants_bullish = ensemble.signal_type == SignalType::Buy;
        let has_entry_pattern = patterns
            .iter()
            .any(|p| p.bullish == wants_bullish && p.trend_confirmed);

        Ok(Some(RawEvaluation {
            signal_type: ensemble.signal_type,
            confidence: ensemble.confidence,
            entry_price: snap.close,
            atr: snap.atr_14,
            has_entry_pattern,
            snapshot: serde_json::to_value(&*snap).unwrap_or(serde_json::Value::Null),
        }))
    }

    async fn snapshot_for(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<Option<Arc<IndicatorSnapshot>>> {
        let bars = self.store.recent_bars(symbol, timeframe, EVALUATION_BARS).await?;
        if bars.len() < MIN_BARS {
            return Ok(None);
        }
        Ok(self.cache.snapshot_for(symbol, timeframe, &bars).await)
    }

    pub fn settings(&self) -> &GlobalSettings {
        &self.settings
    }
}
