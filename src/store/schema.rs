pub const SCHEMA: &str = r#"
-- Identities; ids come from the cache and are never reused
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    guid TEXT NOT NULL UNIQUE,
    level INTEGER NOT NULL DEFAULT 0,
    created_at TEXT DEFAULT (datetime('now')),
    modified_at TEXT,
    last_seen TEXT DEFAULT (datetime('now')),
    name TEXT NOT NULL,
    title TEXT,
    commands TEXT,
    greeting TEXT
);

-- Known identifiers, append-only
CREATE TABLE IF NOT EXISTS hardware_ids (
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    hardware_id TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now')),
    UNIQUE(user_id, hardware_id)
);

CREATE TABLE IF NOT EXISTS ip_addresses (
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    ip_address TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now')),
    UNIQUE(user_id, ip_address)
);

CREATE TABLE IF NOT EXISTS aliases (
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    alias TEXT NOT NULL,
    clean_alias TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now')),
    UNIQUE(user_id, alias)
);

-- Admin edits; changed_by is NULL for the server console
CREATE TABLE IF NOT EXISTS users_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    changes TEXT NOT NULL,
    changed_by INTEGER,
    timestamp TEXT DEFAULT (datetime('now'))
);

-- Admin levels
CREATE TABLE IF NOT EXISTS levels (
    level INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    permissions INTEGER NOT NULL DEFAULT 0,
    greeting TEXT
);

-- Bans; expired rows are kept for audit
CREATE TABLE IF NOT EXISTS bans (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    guid TEXT,
    hardware_id TEXT,
    ip TEXT,
    banned_by TEXT NOT NULL,
    banned_by_id INTEGER,
    reason TEXT,
    created_at TEXT DEFAULT (datetime('now')),
    expires_at TEXT            -- NULL = never
);

-- Create indexes
CREATE INDEX IF NOT EXISTS idx_hardware_ids_user ON hardware_ids(user_id);
CREATE INDEX IF NOT EXISTS idx_ip_addresses_user ON ip_addresses(user_id);
CREATE INDEX IF NOT EXISTS idx_aliases_clean ON aliases(clean_alias);
CREATE INDEX IF NOT EXISTS idx_users_log_user ON users_log(user_id);
CREATE INDEX IF NOT EXISTS idx_users_level ON users(level);
"#;
