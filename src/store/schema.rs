/// Host tables: users, their key/value metadata, tenants and persisted options.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    login TEXT NOT NULL UNIQUE,
    email TEXT NOT NULL DEFAULT '',
    display_name TEXT NOT NULL DEFAULT '',
    registered_at TEXT DEFAULT (datetime('now'))
);

-- Generic key/value metadata; holds the legacy capabilities blobs
CREATE TABLE IF NOT EXISTS usermeta (
    umeta_id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    meta_key TEXT NOT NULL,
    meta_value TEXT NOT NULL DEFAULT '',
    UNIQUE(user_id, meta_key)
);

CREATE TABLE IF NOT EXISTS tenants (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now'))
);

-- Process-wide flags (installed table version, last backfill)
CREATE TABLE IF NOT EXISTS options (
    name TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

INSERT OR IGNORE INTO tenants (id, name) VALUES (1, 'main');

CREATE INDEX IF NOT EXISTS idx_usermeta_key ON usermeta(meta_key);
"#;

/// The normalized role table, created by install.
pub const ROLE_TABLE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS user_roles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,  -- never reused, even after truncation
    user_id INTEGER NOT NULL,
    tenant_id INTEGER NOT NULL DEFAULT 1,
    role TEXT NOT NULL,

    UNIQUE(user_id, tenant_id, role)
);

CREATE INDEX IF NOT EXISTS idx_user_roles_user ON user_roles(user_id);
CREATE INDEX IF NOT EXISTS idx_user_roles_role ON user_roles(role);
"#;
