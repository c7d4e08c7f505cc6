use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single bid/ask quote for a symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: String,
    pub bid: f64,
    pub ask: f64,
    pub spread: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub volume: f64,
}

/// OHLCV bar data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Bar aggregation interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
    W1,
    MN1,
}

impl Timeframe {
    pub fn to_minutes(&self) -> i64 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::M30 => 30,
            Timeframe::H1 => 60,
            Timeframe::H4 => 240,
            Timeframe::D1 => 1440,
            Timeframe::W1 => 10080,
            Timeframe::MN1 => 43200,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Timeframe::M1 => "M1",
            Timeframe::M5 => "M5",
            Timeframe::M15 => "M15",
            Timeframe::M30 => "M30",
            Timeframe::H1 => "H1",
            Timeframe::H4 => "H4",
            Timeframe::D1 => "D1",
            Timeframe::W1 => "W1",
            Timeframe::MN1 => "MN1",
        }
    }

    pub fn parse(s: &str) -> Option<Timeframe> {
        match s {
            "M1" => Some(Timeframe::M1),
            "M5" => Some(Timeframe::M5),
            "M15" => Some(Timeframe::M15),
            "M30" => Some(Timeframe::M30),
            "H1" => Some(Timeframe::H1),
            "H4" => Some(Timeframe::H4),
            "D1" => Some(Timeframe::D1),
            "W1" => Some(Timeframe::W1),
            "MN1" => Some(Timeframe::MN1),
            _ => None,
        }
    }

    /// The next-higher timeframe used for confluence checks.
    pub fn higher(&self) -> Option<Timeframe> {
        match self {
            Timeframe::M1 => Some(Timeframe::M5),
            Timeframe::M5 => Some(Timeframe::M15),
            Timeframe::M15 => Some(Timeframe::H1),
            Timeframe::M30 => Some(Timeframe::H4),
            Timeframe::H1 => Some(Timeframe::H4),
            Timeframe::H4 => Some(Timeframe::D1),
            Timeframe::D1 => Some(Timeframe::W1),
            Timeframe::W1 => Some(Timeframe::MN1),
            Timeframe::MN1 => None,
        }
    }

    pub fn all() -> Vec<Timeframe> {
        vec![
            Timeframe::M1,
            Timeframe::M5,
            Timeframe::M15,
            Timeframe::M30,
            Timeframe::H1,
            Timeframe::H4,
            Timeframe::D1,
            Timeframe::W1,
            Timeframe::MN1,
        ]
    }
}

/// Signal direction emitted by the signal engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalType {
    Buy,
    Sell,
    Hold,
    Close,
}

impl SignalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::Buy => "BUY",
            SignalType::Sell => "SELL",
            SignalType::Hold => "HOLD",
            SignalType::Close => "CLOSE",
        }
    }

    pub fn parse(s: &str) -> Option<SignalType> {
        match s {
            "BUY" => Some(SignalType::Buy),
            "SELL" => Some(SignalType::Sell),
            "HOLD" => Some(SignalType::Hold),
            "CLOSE" => Some(SignalType::Close),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeDirection {
    Buy,
    Sell,
}

impl TradeDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeDirection::Buy => "BUY",
            TradeDirection::Sell => "SELL",
        }
    }

    pub fn parse(s: &str) -> Option<TradeDirection> {
        match s {
            "BUY" => Some(TradeDirection::Buy),
            "SELL" => Some(TradeDirection::Sell),
            _ => None,
        }
    }

    /// +1.0 for BUY, -1.0 for SELL. Used to mirror price arithmetic.
    pub fn sign(&self) -> f64 {
        match self {
            TradeDirection::Buy => 1.0,
            TradeDirection::Sell => -1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Open,
    Closed,
    Pending,
    Cancelled,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Open => "open",
            TradeStatus::Closed => "closed",
            TradeStatus::Pending => "pending",
            TradeStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<TradeStatus> {
        match s {
            "open" => Some(TradeStatus::Open),
            "closed" => Some(TradeStatus::Closed),
            "pending" => Some(TradeStatus::Pending),
            "cancelled" => Some(TradeStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CloseReason {
    TpHit,
    SlHit,
    TrailingStop,
    TimeExit,
    StrategyInvalid,
    EmergencyClose,
    SyncReconciliation,
    Manual,
    Unknown,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::TpHit => "TP_HIT",
            CloseReason::SlHit => "SL_HIT",
            CloseReason::TrailingStop => "TRAILING_STOP",
            CloseReason::TimeExit => "TIME_EXIT",
            CloseReason::StrategyInvalid => "STRATEGY_INVALID",
            CloseReason::EmergencyClose => "EMERGENCY_CLOSE",
            CloseReason::SyncReconciliation => "SYNC_RECONCILIATION",
            CloseReason::Manual => "MANUAL",
            CloseReason::Unknown => "UNKNOWN",
        }
    }

    pub fn parse(s: &str) -> CloseReason {
        match s {
            "TP_HIT" => CloseReason::TpHit,
            "SL_HIT" => CloseReason::SlHit,
            "TRAILING_STOP" => CloseReason::TrailingStop,
            "TIME_EXIT" => CloseReason::TimeExit,
            "STRATEGY_INVALID" => CloseReason::StrategyInvalid,
            "EMERGENCY_CLOSE" => CloseReason::EmergencyClose,
            "SYNC_RECONCILIATION" => CloseReason::SyncReconciliation,
            "MANUAL" => CloseReason::Manual,
            _ => CloseReason::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeSource {
    #[serde(rename = "autotrade")]
    Autotrade,
    #[serde(rename = "ea_command")]
    EaCommand,
    #[serde(rename = "MT5")]
    Mt5,
}

impl TradeSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSource::Autotrade => "autotrade",
            TradeSource::EaCommand => "ea_command",
            TradeSource::Mt5 => "MT5",
        }
    }

    pub fn parse(s: &str) -> Option<TradeSource> {
        match s {
            "autotrade" => Some(TradeSource::Autotrade),
            "ea_command" => Some(TradeSource::EaCommand),
            "MT5" => Some(TradeSource::Mt5),
            _ => None,
        }
    }
}

/// A trade as tracked by the server. The EA's position list is authoritative;
/// rows here mirror what the EA has reported plus server-side annotations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: i64,
    pub ticket: i64,
    pub account_id: i64,
    pub symbol: String,
    pub direction: TradeDirection,
    pub volume: f64,
    pub open_price: f64,
    pub open_time: DateTime<Utc>,
    pub close_price: Option<f64>,
    pub close_time: Option<DateTime<Utc>>,
    pub sl: Option<f64>,
    pub tp: Option<f64>,
    pub initial_sl: Option<f64>,
    pub initial_tp: Option<f64>,
    pub original_tp: Option<f64>,
    pub tp_extended_count: i32,
    pub status: TradeStatus,
    pub close_reason: Option<CloseReason>,
    pub source: TradeSource,
    pub command_id: Option<Uuid>,
    pub signal_id: Option<i64>,
    pub entry_reason: Option<String>,
    pub entry_bid: Option<f64>,
    pub entry_ask: Option<f64>,
    pub entry_spread: Option<f64>,
    pub exit_bid: Option<f64>,
    pub exit_ask: Option<f64>,
    pub exit_spread: Option<f64>,
    pub session: Option<Session>,
    pub max_favorable_excursion: f64,
    pub max_adverse_excursion: f64,
    pub trailing_stop_active: bool,
    pub trailing_stop_moves: i32,
    pub pips_captured: Option<f64>,
    pub risk_reward_realized: Option<f64>,
    pub hold_duration_minutes: Option<i64>,
    pub profit: Option<f64>,
    pub commission: Option<f64>,
    pub swap: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalStatus {
    Active,
    Executed,
    Expired,
    Superseded,
}

impl SignalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalStatus::Active => "active",
            SignalStatus::Executed => "executed",
            SignalStatus::Expired => "expired",
            SignalStatus::Superseded => "superseded",
        }
    }
}

/// A generated trading signal. At most one active signal exists per
/// (account_id, symbol, timeframe); the storage layer enforces this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: i64,
    pub account_id: i64,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub signal_type: SignalType,
    pub confidence: f64,
    pub entry_price: f64,
    pub sl_price: Option<f64>,
    pub tp_price: Option<f64>,
    pub indicator_snapshot: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: SignalStatus,
}

impl Signal {
    pub fn age_minutes(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_minutes()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandType {
    OpenTrade,
    ModifyTrade,
    CloseTrade,
    CloseAll,
    RequestHistoricalData,
    GetAccountInfo,
    Ping,
}

impl CommandType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandType::OpenTrade => "OPEN_TRADE",
            CommandType::ModifyTrade => "MODIFY_TRADE",
            CommandType::CloseTrade => "CLOSE_TRADE",
            CommandType::CloseAll => "CLOSE_ALL",
            CommandType::RequestHistoricalData => "REQUEST_HISTORICAL_DATA",
            CommandType::GetAccountInfo => "GET_ACCOUNT_INFO",
            CommandType::Ping => "PING",
        }
    }

    pub fn parse(s: &str) -> Option<CommandType> {
        match s {
            "OPEN_TRADE" => Some(CommandType::OpenTrade),
            "MODIFY_TRADE" => Some(CommandType::ModifyTrade),
            "CLOSE_TRADE" => Some(CommandType::CloseTrade),
            "CLOSE_ALL" => Some(CommandType::CloseAll),
            "REQUEST_HISTORICAL_DATA" => Some(CommandType::RequestHistoricalData),
            "GET_ACCOUNT_INFO" => Some(CommandType::GetAccountInfo),
            "PING" => Some(CommandType::Ping),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CommandPriority {
    Low,
    Normal,
    High,
    Critical,
}

impl CommandPriority {
    pub fn value(&self) -> i32 {
        match self {
            CommandPriority::Low => 1,
            CommandPriority::Normal => 5,
            CommandPriority::High => 10,
            CommandPriority::Critical => 99,
        }
    }

    pub fn from_value(v: i32) -> CommandPriority {
        match v {
            99.. => CommandPriority::Critical,
            10..=98 => CommandPriority::High,
            2..=9 => CommandPriority::Normal,
            _ => CommandPriority::Low,
        }
    }

    /// Higher priorities get tighter execution deadlines.
    pub fn default_timeout_seconds(&self) -> i64 {
        match self {
            CommandPriority::Critical => 5,
            CommandPriority::High => 10,
            CommandPriority::Low | CommandPriority::Normal => 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CommandStatus {
    Pending,
    Executing,
    Completed,
    Failed,
    Timeout,
}

impl CommandStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandStatus::Pending => "PENDING",
            CommandStatus::Executing => "EXECUTING",
            CommandStatus::Completed => "COMPLETED",
            CommandStatus::Failed => "FAILED",
            CommandStatus::Timeout => "TIMEOUT",
        }
    }

    pub fn parse(s: &str) -> Option<CommandStatus> {
        match s {
            "PENDING" => Some(CommandStatus::Pending),
            "EXECUTING" => Some(CommandStatus::Executing),
            "COMPLETED" => Some(CommandStatus::Completed),
            "FAILED" => Some(CommandStatus::Failed),
            "TIMEOUT" => Some(CommandStatus::Timeout),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CommandStatus::Completed | CommandStatus::Failed | CommandStatus::Timeout
        )
    }
}

/// A command queued for the EA to execute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub command_id: Uuid,
    pub account_id: i64,
    pub command_type: CommandType,
    pub payload: serde_json::Value,
    pub priority: CommandPriority,
    pub status: CommandStatus,
    pub retry_count: i32,
    pub max_retries: i32,
    pub timeout_seconds: i64,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub response: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub linked_signal_id: Option<i64>,
}

impl Command {
    pub fn new(
        account_id: i64,
        command_type: CommandType,
        payload: serde_json::Value,
        priority: CommandPriority,
    ) -> Self {
        Self {
            command_id: Uuid::new_v4(),
            account_id,
            command_type,
            payload,
            priority,
            status: CommandStatus::Pending,
            retry_count: 0,
            max_retries: 3,
            timeout_seconds: priority.default_timeout_seconds(),
            created_at: Utc::now(),
            sent_at: None,
            completed_at: None,
            response: None,
            error_message: None,
            linked_signal_id: None,
        }
    }
}

/// Broker-imposed symbol constraints used during TP/SL and sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerSymbolInfo {
    pub account_id: i64,
    pub symbol: String,
    pub digits: i32,
    pub point_value: f64,
    pub stops_level: i32,
    pub freeze_level: i32,
    pub volume_min: f64,
    pub volume_max: f64,
    pub volume_step: f64,
}

impl BrokerSymbolInfo {
    /// Sensible defaults for a 5-digit FX symbol when the broker has not
    /// reported metadata yet.
    pub fn fallback(account_id: i64, symbol: &str) -> Self {
        Self {
            account_id,
            symbol: symbol.to_string(),
            digits: 5,
            point_value: 0.00001,
            stops_level: 10,
            freeze_level: 0,
            volume_min: 0.01,
            volume_max: 100.0,
            volume_step: 0.01,
        }
    }

    /// Round a price to the broker's digit precision.
    pub fn round_price(&self, price: f64) -> f64 {
        let factor = 10f64.powi(self.digits);
        (price * factor).round() / factor
    }

    /// Minimum price distance imposed by stops_level, in price units.
    pub fn min_stop_distance(&self) -> f64 {
        self.stops_level as f64 * self.point_value
    }
}

/// An authenticated brokerage account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub broker_account_number: i64,
    pub broker_name: String,
    pub currency: String,
    pub balance: f64,
    pub equity: f64,
    pub margin: f64,
    pub free_margin: f64,
    pub initial_balance: f64,
    pub profit_today: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HistoryEventType {
    SlModified,
    TpModified,
    VolumeModified,
}

impl HistoryEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryEventType::SlModified => "SL_MODIFIED",
            HistoryEventType::TpModified => "TP_MODIFIED",
            HistoryEventType::VolumeModified => "VOLUME_MODIFIED",
        }
    }
}

/// Append-only audit record for a trade modification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeHistoryEvent {
    pub trade_id: i64,
    pub event_type: HistoryEventType,
    pub old_value: Option<f64>,
    pub new_value: Option<f64>,
    pub reason: String,
    pub source: String,
    pub price_at_change: Option<f64>,
    pub spread_at_change: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DecisionImpact {
    Low,
    Medium,
    High,
    Critical,
}

impl DecisionImpact {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionImpact::Low => "LOW",
            DecisionImpact::Medium => "MEDIUM",
            DecisionImpact::High => "HIGH",
            DecisionImpact::Critical => "CRITICAL",
        }
    }
}

/// One gating decision made by the auto-trader or a protection worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiDecision {
    pub timestamp: DateTime<Utc>,
    pub decision_type: String,
    pub account_id: i64,
    pub symbol: Option<String>,
    pub signal_id: Option<i64>,
    pub approved: bool,
    pub reason: String,
    pub details: serde_json::Value,
    pub impact: DecisionImpact,
    pub action_required: bool,
}

/// Active market period, derived from a fixed UTC calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Session {
    London,
    #[serde(rename = "NY")]
    NewYork,
    Asia,
    Sydney,
}

impl Session {
    pub fn as_str(&self) -> &'static str {
        match self {
            Session::London => "London",
            Session::NewYork => "NY",
            Session::Asia => "Asia",
            Session::Sydney => "Sydney",
        }
    }

    pub fn parse(s: &str) -> Option<Session> {
        match s {
            "London" => Some(Session::London),
            "NY" => Some(Session::NewYork),
            "Asia" => Some(Session::Asia),
            "Sydney" => Some(Session::Sydney),
            _ => None,
        }
    }

    /// Primary session at a UTC time. Sessions overlap; ties resolve
    /// NY > London > Asia > Sydney.
    pub fn at(time: DateTime<Utc>) -> Session {
        let hour = time.hour();
        // NY 12-21, London 07-16, Asia 23-08, Sydney 21-06 (UTC)
        if (12..21).contains(&hour) {
            Session::NewYork
        } else if (7..16).contains(&hour) {
            Session::London
        } else if hour >= 23 || hour < 8 {
            Session::Asia
        } else {
            Session::Sydney
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timeframe_roundtrip() {
        for tf in Timeframe::all() {
            assert_eq!(Timeframe::parse(tf.name()), Some(tf));
        }
    }

    #[test]
    fn priority_ordering() {
        assert!(CommandPriority::Critical > CommandPriority::High);
        assert!(CommandPriority::High > CommandPriority::Normal);
        assert!(CommandPriority::Normal > CommandPriority::Low);
        assert_eq!(CommandPriority::from_value(99), CommandPriority::Critical);
        assert_eq!(CommandPriority::from_value(5), CommandPriority::Normal);
    }

    #[test]
    fn priority_timeouts() {
        assert_eq!(CommandPriority::Normal.default_timeout_seconds(), 30);
        assert_eq!(CommandPriority::High.default_timeout_seconds(), 10);
        assert_eq!(CommandPriority::Critical.default_timeout_seconds(), 5);
    }

    #[test]
    fn session_priority_in_overlaps() {
        // 13:00 UTC: both London and NY are open; NY wins
        let t = Utc.with_ymd_and_hms(2025, 6, 2, 13, 0, 0).unwrap();
        assert_eq!(Session::at(t), Session::NewYork);

        // 08:00 UTC: London only
        let t = Utc.with_ymd_and_hms(2025, 6, 2, 8, 0, 0).unwrap();
        assert_eq!(Session::at(t), Session::London);

        // 02:00 UTC: Asia (overlapping Sydney)
        let t = Utc.with_ymd_and_hms(2025, 6, 2, 2, 0, 0).unwrap();
        assert_eq!(Session::at(t), Session::Asia);

        // 22:00 UTC: Sydney only
        let t = Utc.with_ymd_and_hms(2025, 6, 2, 22, 0, 0).unwrap();
        assert_eq!(Session::at(t), Session::Sydney);
    }

    #[test]
    fn close_reason_unknown_fallback() {
        assert_eq!(CloseReason::parse("nonsense"), CloseReason::Unknown);
        assert_eq!(CloseReason::parse("TP_HIT"), CloseReason::TpHit);
    }
}
