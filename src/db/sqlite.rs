//! SQLite settings store.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

use super::schema::{SQLITE_MIGRATIONS, SQLITE_VERSION_TABLE};
use super::{FeedInfo, FeedRow, SettingsStore};
use crate::{BotError, Result};

/// Settings store backed by a SQLite database file or an in-memory database.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open a database at the specified path.
    ///
    /// If the database file doesn't exist, it will be created.
    /// Migrations are automatically applied.
    pub async fn open(path: impl AsRef<Path>, max_connections: u32) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening SQLite database at {:?}", path);

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| BotError::DatabaseConnection(e.to_string()))?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Open an in-memory database for testing.
    ///
    /// Every connection to `sqlite::memory:` is a separate database, so the
    /// pool is pinned to one connection that is never recycled.
    pub async fn open_in_memory() -> Result<Self> {
        debug!("Opening in-memory database");
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| BotError::DatabaseConnection(e.to_string()))?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| BotError::DatabaseConnection(e.to_string()))?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Get the current schema version.
    pub async fn schema_version(&self) -> Result<i64> {
        if !self.table_exists("migration_version").await? {
            return Ok(0);
        }
        let version: i64 =
            sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM migration_version")
                .fetch_one(&self.pool)
                .await?;
        Ok(version)
    }

    /// Apply pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(SQLITE_VERSION_TABLE)
            .execute(&self.pool)
            .await
            .map_err(|e| BotError::DatabaseConnection(e.to_string()))?;

        let current_version = self.schema_version().await?;
        let latest = SQLITE_MIGRATIONS.len() as i64;

        if current_version >= latest {
            debug!("Database is up to date (version {})", current_version);
            return Ok(());
        }

        info!(
            "Migrating database from version {} to {}",
            current_version, latest
        );

        for (i, migration) in SQLITE_MIGRATIONS
            .iter()
            .enumerate()
            .skip(current_version as usize)
        {
            let version = (i + 1) as i64;
            info!("Applying migration v{}", version);

            let migration_error = |e: sqlx::Error| BotError::Migration {
                version,
                message: e.to_string(),
            };

            let mut tx = self.pool.begin().await.map_err(migration_error)?;
            sqlx::raw_sql(migration)
                .execute(&mut *tx)
                .await
                .map_err(migration_error)?;
            sqlx::query("INSERT INTO migration_version (version) VALUES (?)")
                .bind(version)
                .execute(&mut *tx)
                .await
                .map_err(migration_error)?;
            tx.commit().await.map_err(migration_error)?;

            debug!("Migration v{} applied successfully", version);
        }

        info!("Database migration complete (now at version {})", latest);
        Ok(())
    }

    /// Check if a table exists.
    pub async fn table_exists(&self, table_name: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?)",
        )
        .bind(table_name)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish()
    }
}

const UPSERT_ROOM: &str = "INSERT OR IGNORE INTO room (room_id) VALUES (?)";

impl SettingsStore for SqliteStore {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    async fn set_room_admin(&self, room: &str, user: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(UPSERT_ROOM).bind(room).execute(&mut *tx).await?;
        sqlx::query("INSERT OR IGNORE INTO admin (admin_id) VALUES (?)")
            .bind(user)
            .execute(&mut *tx)
            .await?;
        sqlx::query("INSERT OR IGNORE INTO room_admin (room_id, admin_id) VALUES (?, ?)")
            .bind(room)
            .bind(user)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn remove_room_admin(&self, room: &str, user: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM room_admin WHERE room_id = ? AND admin_id = ?")
            .bind(room)
            .bind(user)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_room_admins(&self, room: &str) -> Result<Vec<String>> {
        let admins = sqlx::query_scalar(
            "SELECT admin_id FROM room_admin WHERE room_id = ? ORDER BY admin_id",
        )
        .bind(room)
        .fetch_all(&self.pool)
        .await?;
        Ok(admins)
    }

    async fn is_room_admin(&self, room: &str, user: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM room_admin WHERE room_id = ? AND admin_id = ?)",
        )
        .bind(room)
        .bind(user)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn get_personality(&self, room: &str) -> Result<String> {
        let personality: Option<String> =
            sqlx::query_scalar("SELECT personality FROM room WHERE room_id = ?")
                .bind(room)
                .fetch_optional(&self.pool)
                .await?;
        Ok(personality.unwrap_or_default())
    }

    async fn set_personality(&self, room: &str, text: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(UPSERT_ROOM).bind(room).execute(&mut *tx).await?;
        sqlx::query("UPDATE room SET personality = ? WHERE room_id = ?")
            .bind(text)
            .bind(room)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_interject_odds(&self, room: &str) -> Result<f64> {
        let odds: Option<f64> =
            sqlx::query_scalar("SELECT interject_odds FROM room WHERE room_id = ?")
                .bind(room)
                .fetch_optional(&self.pool)
                .await?;
        Ok(odds.unwrap_or(0.0))
    }

    async fn set_interject_odds(&self, room: &str, odds: f64) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(UPSERT_ROOM).bind(room).execute(&mut *tx).await?;
        sqlx::query("UPDATE room SET interject_odds = ? WHERE room_id = ?")
            .bind(odds)
            .bind(room)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_hide_in_threads(&self, room: &str) -> Result<bool> {
        let hide: Option<bool> =
            sqlx::query_scalar("SELECT hide_in_threads FROM room WHERE room_id = ?")
                .bind(room)
                .fetch_optional(&self.pool)
                .await?;
        Ok(hide.unwrap_or(false))
    }

    async fn toggle_hide_in_threads(&self, room: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(UPSERT_ROOM).bind(room).execute(&mut *tx).await?;
        let hide: bool = sqlx::query_scalar(
            "UPDATE room SET hide_in_threads = NOT hide_in_threads WHERE room_id = ? \
             RETURNING hide_in_threads",
        )
        .bind(room)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(hide)
    }

    async fn add_feed_subscription(&self, room: &str, url: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(UPSERT_ROOM).bind(room).execute(&mut *tx).await?;
        sqlx::query("INSERT OR IGNORE INTO rss_feed (url, last_update) VALUES (?, ?)")
            .bind(url)
            .bind(Utc::now().timestamp())
            .execute(&mut *tx)
            .await?;
        let result =
            sqlx::query("INSERT OR IGNORE INTO rss_subscription (url, room_id) VALUES (?, ?)")
                .bind(url)
                .bind(room)
                .execute(&mut *tx)
                .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove_feed_subscription(&self, room: &str, url: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM rss_subscription WHERE url = ? AND room_id = ?")
            .bind(url)
            .bind(room)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_room_feeds(&self, room: &str) -> Result<Vec<String>> {
        let feeds =
            sqlx::query_scalar("SELECT url FROM rss_subscription WHERE room_id = ? ORDER BY url")
                .bind(room)
                .fetch_all(&self.pool)
                .await?;
        Ok(feeds)
    }

    async fn list_rooms_for_feed(&self, url: &str) -> Result<Vec<String>> {
        let rooms =
            sqlx::query_scalar("SELECT room_id FROM rss_subscription WHERE url = ? ORDER BY room_id")
                .bind(url)
                .fetch_all(&self.pool)
                .await?;
        Ok(rooms)
    }

    async fn list_all_feeds(&self) -> Result<Vec<FeedInfo>> {
        let rows = sqlx::query_as::<_, FeedRow>(
            r#"
            SELECT DISTINCT f.url, f.last_update, f.display_name
            FROM rss_feed f
            JOIN rss_subscription s ON s.url = f.url
            ORDER BY f.url
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(FeedInfo::from).collect())
    }

    async fn set_feed_watermark(&self, url: &str, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE rss_feed SET last_update = ? WHERE url = ?")
            .bind(at.timestamp())
            .bind(url)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_feed_display_name(&self, url: &str, name: &str) -> Result<()> {
        sqlx::query("UPDATE rss_feed SET display_name = ? WHERE url = ?")
            .bind(name)
            .bind(url)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_greeting(&self) -> Result<Option<String>> {
        let greeting = sqlx::query_scalar("SELECT greeting FROM greeting WHERE id = 0")
            .fetch_optional(&self.pool)
            .await?;
        Ok(greeting)
    }

    async fn set_greeting(&self, text: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO greeting (id, greeting) VALUES (0, ?) \
             ON CONFLICT(id) DO UPDATE SET greeting = excluded.greeting",
        )
        .bind(text)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
