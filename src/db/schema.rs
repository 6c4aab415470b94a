//! Database schema and migrations for roomwarden.
//!
//! Each backend carries its own list. Migrations are applied in order, one
//! transaction per migration, and the `migration_version` table records
//! which ones have run.

/// Table that records applied migration levels. Created before any migration.
pub const SQLITE_VERSION_TABLE: &str =
    "CREATE TABLE IF NOT EXISTS migration_version (version INTEGER PRIMARY KEY)";

/// See [`SQLITE_VERSION_TABLE`].
pub const POSTGRES_VERSION_TABLE: &str =
    "CREATE TABLE IF NOT EXISTS migration_version (version BIGINT PRIMARY KEY)";

/// SQLite migrations.
pub const SQLITE_MIGRATIONS: &[&str] = &[
    // v1: rooms, admins, greeting, feeds and subscriptions
    r#"
CREATE TABLE greeting (
    id          INTEGER PRIMARY KEY CHECK (id = 0),
    greeting    TEXT NOT NULL
);

CREATE TABLE admin (
    admin_id    TEXT PRIMARY KEY
);

CREATE TABLE room (
    room_id     TEXT PRIMARY KEY,
    personality TEXT NOT NULL DEFAULT ''   -- '' means the configured default
);

CREATE TABLE room_admin (
    room_id     TEXT NOT NULL REFERENCES room(room_id) ON DELETE CASCADE,
    admin_id    TEXT NOT NULL REFERENCES admin(admin_id) ON DELETE CASCADE,
    PRIMARY KEY (room_id, admin_id)
);

CREATE TABLE rss_feed (
    url         TEXT PRIMARY KEY,
    last_update BIGINT NOT NULL            -- Unix seconds, UTC
);

CREATE TABLE rss_subscription (
    url         TEXT NOT NULL REFERENCES rss_feed(url) ON DELETE CASCADE,
    room_id     TEXT NOT NULL REFERENCES room(room_id) ON DELETE CASCADE,
    PRIMARY KEY (url, room_id)
);

CREATE INDEX idx_rss_subscription_room_id ON rss_subscription(room_id);
"#,
    // v2: per-room interjection odds and thread hiding, cached feed title
    r#"
ALTER TABLE room ADD COLUMN interject_odds REAL NOT NULL DEFAULT 0.0;
ALTER TABLE room ADD COLUMN hide_in_threads INTEGER NOT NULL DEFAULT 0;
ALTER TABLE rss_feed ADD COLUMN display_name TEXT;
"#,
];

/// PostgreSQL migrations.
pub const POSTGRES_MIGRATIONS: &[&str] = &[
    // v1: rooms, admins, greeting, feeds and subscriptions
    r#"
CREATE TABLE greeting (
    id          INTEGER PRIMARY KEY CHECK (id = 0),
    greeting    TEXT NOT NULL
);

CREATE TABLE admin (
    admin_id    TEXT PRIMARY KEY
);

CREATE TABLE room (
    room_id     TEXT PRIMARY KEY,
    personality TEXT NOT NULL DEFAULT ''
);

CREATE TABLE room_admin (
    room_id     TEXT NOT NULL REFERENCES room(room_id) ON DELETE CASCADE,
    admin_id    TEXT NOT NULL REFERENCES admin(admin_id) ON DELETE CASCADE,
    PRIMARY KEY (room_id, admin_id)
);

CREATE TABLE rss_feed (
    url         TEXT PRIMARY KEY,
    last_update BIGINT NOT NULL
);

CREATE TABLE rss_subscription (
    url         TEXT NOT NULL REFERENCES rss_feed(url) ON DELETE CASCADE,
    room_id     TEXT NOT NULL REFERENCES room(room_id) ON DELETE CASCADE,
    PRIMARY KEY (url, room_id)
);

CREATE INDEX idx_rss_subscription_room_id ON rss_subscription(room_id);
"#,
    // v2: per-room interjection odds and thread hiding, cached feed title
    r#"
ALTER TABLE room ADD COLUMN interject_odds DOUBLE PRECISION NOT NULL DEFAULT 0;
ALTER TABLE room ADD COLUMN hide_in_threads BOOLEAN NOT NULL DEFAULT FALSE;
ALTER TABLE rss_feed ADD COLUMN display_name TEXT;
"#,
];
