//! Table definitions, applied idempotently at startup

/// Directory users. Written by the account service; read here.
pub const CREATE_USERS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    display_name TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1
)";

pub const CREATE_CALL_LOGS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS call_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    caller_id TEXT NOT NULL,
    callee_id TEXT NOT NULL,
    room_name TEXT NOT NULL UNIQUE,
    status TEXT NOT NULL,
    started_at TEXT NOT NULL,
    ended_at TEXT,
    duration_seconds INTEGER
)";

pub const CREATE_CALL_LOGS_CALLER_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_call_logs_caller ON call_logs (caller_id, started_at)";

pub const CREATE_CALL_LOGS_CALLEE_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_call_logs_callee ON call_logs (callee_id, started_at)";

pub const STATEMENTS: &[&str] = &[
    CREATE_USERS_TABLE,
    CREATE_CALL_LOGS_TABLE,
    CREATE_CALL_LOGS_CALLER_INDEX,
    CREATE_CALL_LOGS_CALLEE_INDEX,
];
