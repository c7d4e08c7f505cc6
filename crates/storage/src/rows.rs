use trading_core::{
    CloseReason, Command, CommandPriority, CommandStatus, CommandType, Session, Signal,
    SignalStatus, SignalType, Timeframe, Trade, TradeDirection, TradeSource, TradeStatus,
};
use uuid::Uuid;

use crate::parse_ts;

/// DB representation of a trade (TEXT enums and timestamps).
#[derive(sqlx::FromRow)]
pub(crate) struct TradeRow {
    pub id: i64,
    pub ticket: i64,
    pub account_id: i64,
    pub symbol: String,
    pub direction: String,
    pub volume: f64,
    pub open_price: f64,
    pub open_time: String,
    pub close_price: Option<f64>,
    pub close_time: Option<String>,
    pub sl: Option<f64>,
    pub tp: Option<f64>,
    pub initial_sl: Option<f64>,
    pub initial_tp: Option<f64>,
    pub original_tp: Option<f64>,
    pub tp_extended_count: i32,
    pub status: String,
    pub close_reason: Option<String>,
    pub source: String,
    pub command_id: Option<String>,
    pub signal_id: Option<i64>,
    pub entry_reason: Option<String>,
    pub entry_bid: Option<f64>,
    pub entry_ask: Option<f64>,
    pub entry_spread: Option<f64>,
    pub exit_bid: Option<f64>,
    pub exit_ask: Option<f64>,
    pub exit_spread: Option<f64>,
    pub session: Option<String>,
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

impl From<TradeRow> for Trade {
    fn from(r: TradeRow) -> Self {
        Trade {
            id: r.id,
            ticket: r.ticket,
            account_id: r.account_id,
            symbol: r.symbol,
            direction: TradeDirection::parse(&r.direction).unwrap_or(TradeDirection::Buy),
            volume: r.volume,
            open_price: r.open_price,
            open_time: parse_ts(&r.open_time),
            close_price: r.close_price,
            close_time: r.close_time.as_deref().map(parse_ts),
            sl: r.sl,
            tp: r.tp,
            initial_sl: r.initial_sl,
            initial_tp: r.initial_tp,
            original_tp: r.original_tp,
            tp_extended_count: r.tp_extended_count,
            status: TradeStatus::parse(&r.status).unwrap_or(TradeStatus::Open),
            close_reason: r.close_reason.as_deref().map(CloseReason::parse),
            source: TradeSource::parse(&r.source).unwrap_or(TradeSource::Mt5),
            command_id: r.command_id.as_deref().and_then(|s| Uuid::parse_str(s).ok()),
            signal_id: r.signal_id,
            entry_reason: r.entry_reason,
            entry_bid: r.entry_bid,
            entry_ask: r.entry_ask,
            entry_spread: r.entry_spread,
            exit_bid: r.exit_bid,
            exit_ask: r.exit_ask,
            exit_spread: r.exit_spread,
            session: r.session.as_deref().and_then(Session::parse),
            max_favorable_excursion: r.max_favorable_excursion,
            max_adverse_excursion: r.max_adverse_excursion,
            trailing_stop_active: r.trailing_stop_active,
            trailing_stop_moves: r.trailing_stop_moves,
            pips_captured: r.pips_captured,
            risk_reward_realized: r.risk_reward_realized,
            hold_duration_minutes: r.hold_duration_minutes,
            profit: r.profit,
            commission: r.commission,
            swap: r.swap,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct SignalRow {
    pub id: i64,
    pub account_id: i64,
    pub symbol: String,
    pub timeframe: String,
    pub signal_type: String,
    pub confidence: f64,
    pub entry_price: f64,
    pub sl_price: Option<f64>,
    pub tp_price: Option<f64>,
    pub indicator_snapshot: String,
    pub created_at: String,
    pub updated_at: String,
    pub status: String,
}

impl From<SignalRow> for Signal {
    fn from(r: SignalRow) -> Self {
        Signal {
            id: r.id,
            account_id: r.account_id,
            symbol: r.symbol,
            timeframe: Timeframe::parse(&r.timeframe).unwrap_or(Timeframe::H1),
            signal_type: SignalType::parse(&r.signal_type).unwrap_or(SignalType::Hold),
            confidence: r.confidence,
            entry_price: r.entry_price,
            sl_price: r.sl_price,
            tp_price: r.tp_price,
            indicator_snapshot: serde_json::from_str(&r.indicator_snapshot)
                .unwrap_or(serde_json::Value::Null),
            created_at: parse_ts(&r.created_at),
            updated_at: parse_ts(&r.updated_at),
            status: match r.status.as_str() {
                "executed" => SignalStatus::Executed,
                "expired" => SignalStatus::Expired,
                "superseded" => SignalStatus::Superseded,
                _ => SignalStatus::Active,
            },
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct CommandRow {
    pub command_id: String,
    pub account_id: i64,
    pub command_type: String,
    pub payload: String,
    pub priority: i32,
    pub status: String,
    pub retry_count: i32,
    pub max_retries: i32,
    pub timeout_seconds: i64,
    pub created_at: String,
    pub sent_at: Option<String>,
    pub completed_at: Option<String>,
    pub response: Option<String>,
    pub error_message: Option<String>,
    pub linked_signal_id: Option<i64>,
}

impl From<CommandRow> for Command {
    fn from(r: CommandRow) -> Self {
        Command {
            command_id: Uuid::parse_str(&r.command_id).unwrap_or_default(),
            account_id: r.account_id,
            command_type: CommandType::parse(&r.command_type).unwrap_or(CommandType::Ping),
            payload: serde_json::from_str(&r.payload).unwrap_or(serde_json::Value::Null),
            priority: CommandPriority::from_value(r.priority),
            status: CommandStatus::parse(&r.status).unwrap_or(CommandStatus::Pending),
            retry_count: r.retry_count,
            max_retries: r.max_retries,
            timeout_seconds: r.timeout_seconds,
            created_at: parse_ts(&r.created_at),
            sent_at: r.sent_at.as_deref().map(parse_ts),
            completed_at: r.completed_at.as_deref().map(parse_ts),
            response: r.response.as_deref().and_then(|s| serde_json::from_str(s).ok()),
            error_message: r.error_message,
            linked_signal_id: r.linked_signal_id,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct AccountRow {
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
    pub created_at: String,
}

impl From<AccountRow> for trading_core::Account {
    fn from(r: AccountRow) -> Self {
        trading_core::Account {
            id: r.id,
            broker_account_number: r.broker_account_number,
            broker_name: r.broker_name,
            currency: r.currency,
            balance: r.balance,
            equity: r.equity,
            margin: r.margin,
            free_margin: r.free_margin,
            initial_balance: r.initial_balance,
            profit_today: r.profit_today,
            created_at: parse_ts(&r.created_at),
        }
    }
}
