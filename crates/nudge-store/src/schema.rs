/// SQL DDL for the nudge-store database.
/// WAL mode enabled at connection time.
pub const SCHEMA_VERSION: u32 = 1;

/// Sessions are stored as one JSON document per row; the columns beside it
/// exist for lookup, ordering, retention and optimistic versioning.
pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    session_id TEXT PRIMARY KEY NOT NULL,
    owner_id TEXT,
    start_time TEXT NOT NULL,
    end_time TEXT,
    is_active INTEGER NOT NULL DEFAULT 1,
    version INTEGER NOT NULL DEFAULT 1,
    document TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS nudges (
    id TEXT PRIMARY KEY,
    text TEXT NOT NULL,
    category TEXT NOT NULL DEFAULT 'General',
    usage_count INTEGER NOT NULL DEFAULT 0,
    positive_feedback INTEGER NOT NULL DEFAULT 0,
    negative_feedback INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sessions_owner ON sessions(owner_id, start_time DESC);
CREATE INDEX IF NOT EXISTS idx_sessions_active ON sessions(is_active, start_time DESC);
CREATE INDEX IF NOT EXISTS idx_sessions_start ON sessions(start_time DESC);
CREATE INDEX IF NOT EXISTS idx_sessions_retention ON sessions(is_active, end_time);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);
"#;

/// Per-connection pragmas, applied whenever the pool opens a connection.
pub fn pragmas(busy_timeout_ms: u32) -> String {
    format!(
        "PRAGMA busy_timeout = {busy_timeout_ms};\
         PRAGMA journal_mode = WAL;\
         PRAGMA synchronous = NORMAL;"
    )
}
