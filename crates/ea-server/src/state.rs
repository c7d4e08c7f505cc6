use std::sync::Arc;

use auto_trader::{AutoTrader, EaHealth};
use chrono::{DateTime, Utc};
use command_queue::CommandQueue;
use market_data::{MarketDataService, SpreadStats, TickBuffer};
use position_manager::PositionMonitor;
use risk_manager::{CircuitBreaker, SymbolPauseRegistry};
use signal_engine::SignalEngine;
use storage::Store;
use trading_core::GlobalSettings;

use crate::connection::ConnectionRegistry;

impl EaHealth for ConnectionRegistry {
    fn ea_is_healthy(&self, account_id: i64) -> bool {
        self.is_healthy(account_id)
    }
}

/// Explicitly constructed component container shared by every route. All
/// cross-request state flows through these handles; nothing is global.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub queue: Arc<CommandQueue>,
    pub ticks: Arc<TickBuffer>,
    pub spreads: Arc<SpreadStats>,
    pub market_data: MarketDataService,
    pub engine: Arc<SignalEngine>,
    pub monitor: Arc<PositionMonitor>,
    pub trader: Arc<AutoTrader>,
    pub breaker: Arc<CircuitBreaker>,
    pub sl_pauses: Arc<SymbolPauseRegistry>,
    pub currency_pauses: Arc<SymbolPauseRegistry>,
    pub connections: Arc<ConnectionRegistry>,
    pub settings: GlobalSettings,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Store,
        queue: Arc<CommandQueue>,
        ticks: Arc<TickBuffer>,
        spreads: Arc<SpreadStats>,
        engine: Arc<SignalEngine>,
        monitor: Arc<PositionMonitor>,
        trader: Arc<AutoTrader>,
        breaker: Arc<CircuitBreaker>,
        sl_pauses: Arc<SymbolPauseRegistry>,
        currency_pauses: Arc<SymbolPauseRegistry>,
        connections: Arc<ConnectionRegistry>,
        settings: GlobalSettings,
    ) -> Self {
        Self {
            market_data: MarketDataService::new(store.clone()),
            store,
            queue,
            ticks,
            spreads,
            engine,
            monitor,
            trader,
            breaker,
            sl_pauses,
            currency_pauses,
            connections,
            settings,
            started_at: Utc::now(),
        }
    }
}
