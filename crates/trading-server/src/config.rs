use anyhow::Result;
use std::env;

use ea_server::Ports;

/// Process configuration from the environment. Trading parameters live in
/// GlobalSettings (storage-backed); this covers only wiring concerns.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub database_url: String,
    pub redis_url: Option<String>,
    pub weights_path: Option<String>,
    pub ports: Ports,
    /// Per-symbol tick ring capacity.
    pub tick_ring_capacity: usize,
    /// Buffered ticks that force an early flush.
    pub tick_flush_threshold: usize,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        let ports = Ports {
            control: env::var("CONTROL_PORT")
                .unwrap_or_else(|_| "9900".to_string())
                .parse()?,
            ticks: env::var("TICKS_PORT")
                .unwrap_or_else(|_| "9901".to_string())
                .parse()?,
            trades: env::var("TRADES_PORT")
                .unwrap_or_else(|_| "9902".to_string())
                .parse()?,
            logs: env::var("LOGS_PORT")
                .unwrap_or_else(|_| "9903".to_string())
                .parse()?,
            ops: env::var("OPS_PORT")
                .unwrap_or_else(|_| "9905".to_string())
                .parse()?,
        };

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://trading.db?mode=rwc".to_string()),
            redis_url: env::var("REDIS_URL").ok(),
            weights_path: env::var("WEIGHTS_PATH").ok(),
            ports,
            tick_ring_capacity: env::var("TICK_RING_CAPACITY")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()?,
            tick_flush_threshold: env::var("TICK_FLUSH_THRESHOLD")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()?,
        })
    }
}
