use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;

/// EA session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

/// Runtime state of one EA session.
#[derive(Debug, Clone, Serialize)]
pub struct Connection {
    pub account_id: i64,
    pub state: ConnectionState,
    pub last_heartbeat: DateTime<Utc>,
    pub consecutive_failures: i32,
    pub health_score: f64,
    pub avg_latency_ms: f64,
    pub connected_at: DateTime<Utc>,
}

/// In-memory registry of EA connections with the health state machine.
/// Health starts at 100, drops 10 per failure, recovers 5 per success.
pub struct ConnectionRegistry {
    connections: DashMap<i64, Connection>,
    heartbeat_timeout: Duration,
}

impl ConnectionRegistry {
    pub fn new(heartbeat_interval_seconds: u64) -> Self {
        Self {
            connections: DashMap::new(),
            // A connection is late after three missed heartbeats.
            heartbeat_timeout: Duration::seconds(heartbeat_interval_seconds as i64 * 3),
        }
    }

    /// Register (or resume) a session on /connect.
    pub fn register(&self, account_id: i64) {
        let now = Utc::now();
        self.connections
            .entry(account_id)
            .and_modify(|c| {
                c.state = ConnectionState::Connecting;
                c.last_heartbeat = now;
            })
            .or_insert(Connection {
                account_id,
                state: ConnectionState::Connecting,
                last_heartbeat: now,
                consecutive_failures: 0,
                health_score: 100.0,
                avg_latency_ms: 0.0,
                connected_at: now,
            });
    }

    pub fn deregister(&self, account_id: i64) {
        self.connections.remove(&account_id);
    }

    /// Successful heartbeat: resets failures and promotes to CONNECTED
    /// from any state.
    pub fn record_heartbeat(&self, account_id: i64) {
        if let Some(mut c) = self.connections.get_mut(&account_id) {
            c.last_heartbeat = Utc::now();
            c.consecutive_failures = 0;
            c.state = ConnectionState::Connected;
            c.health_score = (c.health_score + 5.0).min(100.0);
        }
    }

    /// A failed interaction with the EA (rejected command, bad payload).
    pub fn record_failure(&self, account_id: i64) {
        if let Some(mut c) = self.connections.get_mut(&account_id) {
            c.consecutive_failures += 1;
            c.health_score = (c.health_score - 10.0).max(0.0);
            if c.consecutive_failures >= 5 {
                c.state = ConnectionState::Failed;
            }
        }
    }

    /// Exponentially-weighted command round-trip latency.
    pub fn record_latency(&self, account_id: i64, latency_ms: f64) {
        if let Some(mut c) = self.connections.get_mut(&account_id) {
            c.avg_latency_ms = if c.avg_latency_ms == 0.0 {
                latency_ms
            } else {
                c.avg_latency_ms * 0.8 + latency_ms * 0.2
            };
        }
    }

    /// Current state with heartbeat-age transitions applied.
    pub fn state_of(&self, account_id: i64) -> Option<ConnectionState> {
        let mut c = self.connections.get_mut(&account_id)?;
        let age = Utc::now() - c.last_heartbeat;

        match c.state {
            ConnectionState::Connected | ConnectionState::Reconnecting => {
                if age > self.heartbeat_timeout * 3 || c.consecutive_failures >= 5 {
                    c.state = ConnectionState::Failed;
                } else if age > self.heartbeat_timeout {
                    c.state = ConnectionState::Reconnecting;
                }
            }
            ConnectionState::Connecting | ConnectionState::Failed => {}
        }
        Some(c.state)
    }

    /// Healthy: CONNECTED, fresh heartbeat, under 3 consecutive failures,
    /// health above 50.
    pub fn is_healthy(&self, account_id: i64) -> bool {
        let state = match self.state_of(account_id) {
            Some(s) => s,
            None => return false,
        };
        let c = match self.connections.get(&account_id) {
            Some(c) => c,
            None => return false,
        };
        state == ConnectionState::Connected
            && (Utc::now() - c.last_heartbeat) < self.heartbeat_timeout
            && c.consecutive_failures < 3
            && c.health_score > 50.0
    }

    pub fn snapshot(&self, account_id: i64) -> Option<Connection> {
        self.state_of(account_id);
        self.connections.get(&account_id).map(|c| c.clone())
    }

    pub fn all(&self) -> Vec<Connection> {
        let ids: Vec<i64> = self.connections.iter().map(|c| *c.key()).collect();
        ids.into_iter().filter_map(|id| self.snapshot(id)).collect()
    }

    /// Drop sessions whose heartbeat is long gone.
    pub fn prune_idle(&self, idle: Duration) {
        let cutoff = Utc::now() - idle;
        self.connections.retain(|_, c| c.last_heartbeat >= cutoff);
    }
}
