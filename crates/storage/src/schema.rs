use anyhow::Result;
use sqlx::SqlitePool;

const TABLES: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS accounts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        broker_account_number INTEGER NOT NULL,
        broker_name TEXT NOT NULL,
        currency TEXT NOT NULL DEFAULT 'EUR',
        balance REAL NOT NULL DEFAULT 0,
        equity REAL NOT NULL DEFAULT 0,
        margin REAL NOT NULL DEFAULT 0,
        free_margin REAL NOT NULL DEFAULT 0,
        initial_balance REAL NOT NULL DEFAULT 0,
        profit_today REAL NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        UNIQUE(broker_account_number, broker_name)
    )",
    "CREATE TABLE IF NOT EXISTS ticks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        symbol TEXT NOT NULL,
        bid REAL NOT NULL,
        ask REAL NOT NULL,
        spread REAL NOT NULL,
        volume REAL NOT NULL DEFAULT 0,
        timestamp TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_ticks_symbol_time ON ticks(symbol, timestamp)",
    "CREATE TABLE IF NOT EXISTS ohlc_bars (
        symbol TEXT NOT NULL,
        timeframe TEXT NOT NULL,
        open_time TEXT NOT NULL,
        open REAL NOT NULL,
        high REAL NOT NULL,
        low REAL NOT NULL,
        close REAL NOT NULL,
        volume REAL NOT NULL DEFAULT 0,
        PRIMARY KEY (symbol, timeframe, open_time)
    )",
    "CREATE TABLE IF NOT EXISTS signals (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        account_id INTEGER NOT NULL,
        symbol TEXT NOT NULL,
        timeframe TEXT NOT NULL,
        signal_type TEXT NOT NULL,
        confidence REAL NOT NULL,
        entry_price REAL NOT NULL,
        sl_price REAL,
        tp_price REAL,
        indicator_snapshot TEXT NOT NULL DEFAULT '{}',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'active'
    )",
    // At most one active signal per (account, symbol, timeframe); the
    // upsert relies on this index for conflict resolution.
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_signals_active
        ON signals(account_id, symbol, timeframe) WHERE status = 'active'",
    "CREATE TABLE IF NOT EXISTS commands (
        command_id TEXT PRIMARY KEY,
        account_id INTEGER NOT NULL,
        command_type TEXT NOT NULL,
        payload TEXT NOT NULL DEFAULT '{}',
        priority INTEGER NOT NULL DEFAULT 5,
        status TEXT NOT NULL DEFAULT 'PENDING',
        retry_count INTEGER NOT NULL DEFAULT 0,
        max_retries INTEGER NOT NULL DEFAULT 3,
        timeout_seconds INTEGER NOT NULL DEFAULT 30,
        created_at TEXT NOT NULL,
        sent_at TEXT,
        completed_at TEXT,
        response TEXT,
        error_message TEXT,
        linked_signal_id INTEGER
    )",
    "CREATE INDEX IF NOT EXISTS idx_commands_account_status ON commands(account_id, status)",
    "CREATE TABLE IF NOT EXISTS trades (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        ticket INTEGER NOT NULL,
        account_id INTEGER NOT NULL,
        symbol TEXT NOT NULL,
        direction TEXT NOT NULL,
        volume REAL NOT NULL,
        open_price REAL NOT NULL,
        open_time TEXT NOT NULL,
        close_price REAL,
        close_time TEXT,
        sl REAL,
        tp REAL,
        initial_sl REAL,
        initial_tp REAL,
        original_tp REAL,
        tp_extended_count INTEGER NOT NULL DEFAULT 0,
        status TEXT NOT NULL DEFAULT 'open',
        close_reason TEXT,
        source TEXT NOT NULL DEFAULT 'MT5',
        command_id TEXT,
        signal_id INTEGER,
        entry_reason TEXT,
        entry_bid REAL,
        entry_ask REAL,
        entry_spread REAL,
        exit_bid REAL,
        exit_ask REAL,
        exit_spread REAL,
        session TEXT,
        max_favorable_excursion REAL NOT NULL DEFAULT 0,
        max_adverse_excursion REAL NOT NULL DEFAULT 0,
        trailing_stop_active INTEGER NOT NULL DEFAULT 0,
        trailing_stop_moves INTEGER NOT NULL DEFAULT 0,
        pips_captured REAL,
        risk_reward_realized REAL,
        hold_duration_minutes INTEGER,
        profit REAL,
        commission REAL,
        swap REAL,
        UNIQUE(account_id, ticket)
    )",
    "CREATE INDEX IF NOT EXISTS idx_trades_account_status ON trades(account_id, status)",
    "CREATE TABLE IF NOT EXISTS trade_history_events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        trade_id INTEGER NOT NULL,
        event_type TEXT NOT NULL,
        old_value REAL,
        new_value REAL,
        reason TEXT NOT NULL,
        source TEXT NOT NULL,
        price_at_change REAL,
        spread_at_change REAL,
        timestamp TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_history_trade ON trade_history_events(trade_id)",
    "CREATE TABLE IF NOT EXISTS broker_symbols (
        account_id INTEGER NOT NULL,
        symbol TEXT NOT NULL,
        digits INTEGER NOT NULL DEFAULT 5,
        point_value REAL NOT NULL DEFAULT 0.00001,
        stops_level INTEGER NOT NULL DEFAULT 0,
        freeze_level INTEGER NOT NULL DEFAULT 0,
        volume_min REAL NOT NULL DEFAULT 0.01,
        volume_max REAL NOT NULL DEFAULT 100.0,
        volume_step REAL NOT NULL DEFAULT 0.01,
        PRIMARY KEY (account_id, symbol)
    )",
    "CREATE TABLE IF NOT EXISTS global_settings (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS symbol_overrides (
        symbol TEXT PRIMARY KEY,
        tp_atr_mult REAL,
        sl_atr_mult REAL,
        trailing_mult REAL,
        min_confidence REAL
    )",
    "CREATE TABLE IF NOT EXISTS ai_decisions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp TEXT NOT NULL,
        decision_type TEXT NOT NULL,
        account_id INTEGER NOT NULL,
        symbol TEXT,
        signal_id INTEGER,
        approved INTEGER NOT NULL,
        reason TEXT NOT NULL,
        details TEXT NOT NULL DEFAULT '{}',
        impact TEXT NOT NULL DEFAULT 'LOW',
        action_required INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE INDEX IF NOT EXISTS idx_decisions_time ON ai_decisions(timestamp)",
    "CREATE TABLE IF NOT EXISTS symbol_performance_tracking (
        symbol TEXT PRIMARY KEY,
        status TEXT NOT NULL DEFAULT 'active',
        auto_disabled_reason TEXT,
        win_rate_24h REAL NOT NULL DEFAULT 0,
        profit_24h REAL NOT NULL DEFAULT 0,
        sample_24h INTEGER NOT NULL DEFAULT 0,
        updated_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS news_events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        currency TEXT NOT NULL,
        impact TEXT NOT NULL,
        event_time TEXT NOT NULL,
        title TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_news_time ON news_events(event_time)",
];

pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    for stmt in TABLES {
        sqlx::query(stmt).execute(pool).await?;
    }
    Ok(())
}
