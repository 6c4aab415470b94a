//! PostgreSQL settings store.

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info};

use super::schema::{POSTGRES_MIGRATIONS, POSTGRES_VERSION_TABLE};
use super::{FeedInfo, FeedRow, SettingsStore};
use crate::{BotError, Result};

/// Settings store backed by a PostgreSQL server.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect to `url` and apply pending migrations.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        info!("Connecting to PostgreSQL database");
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
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
        sqlx::query(POSTGRES_VERSION_TABLE)
            .execute(&self.pool)
            .await
            .map_err(|e| BotError::DatabaseConnection(e.to_string()))?;

        let current_version = self.schema_version().await?;
        let latest = POSTGRES_MIGRATIONS.len() as i64;

        if current_version >= latest {
            debug!("Database is up to date (version {})", current_version);
            return Ok(());
        }

        info!(
            "Migrating database from version {} to {}",
            current_version, latest
        );

        for (i, migration) in POSTGRES_MIGRATIONS
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

            // DDL is transactional in PostgreSQL, so a failed migration leaves
            // no trace and no version row.
            let mut tx = self.pool.begin().await.map_err(migration_error)?;
            sqlx::raw_sql(migration)
                .execute(&mut *tx)
                .await
                .map_err(migration_error)?;
            sqlx::query("INSERT INTO migration_version (version) VALUES ($1)")
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

    /// Check if a table exists in the current schema.
    pub async fn table_exists(&self, table_name: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_name = $1)",
        )
        .bind(table_name)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl std::fmt::Debug for PostgresStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresStore").finish()
    }
}

const UPSERT_ROOM: &str = "INSERT INTO room (room_id) VALUES ($1) ON CONFLICT DO NOTHING";

impl SettingsStore for PostgresStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn set_room_admin(&self, room: &str, user: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(UPSERT_ROOM).bind(room).execute(&mut *tx).await?;
        sqlx::query("INSERT INTO admin (admin_id) VALUES ($1) ON CONFLICT DO NOTHING")
            .bind(user)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO room_admin (room_id, admin_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(room)
        .bind(user)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn remove_room_admin(&self, room: &str, user: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM room_admin WHERE room_id = $1 AND admin_id = $2")
            .bind(room)
            .bind(user)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_room_admins(&self, room: &str) -> Result<Vec<String>> {
        let admins = sqlx::query_scalar(
            "SELECT admin_id FROM room_admin WHERE room_id = $1 ORDER BY admin_id",
        )
        .bind(room)
        .fetch_all(&self.pool)
        .await?;
        Ok(admins)
    }

    async fn is_room_admin(&self, room: &str, user: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM room_admin WHERE room_id = $1 AND admin_id = $2)",
        )
        .bind(room)
        .bind(user)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn get_personality(&self, room: &str) -> Result<String> {
        let personality: Option<String> =
            sqlx::query_scalar("SELECT personality FROM room WHERE room_id = $1")
                .bind(room)
                .fetch_optional(&self.pool)
                .await?;
        Ok(personality.unwrap_or_default())
    }

    async fn set_personality(&self, room: &str, text: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO room (room_id, personality) VALUES ($1, $2) \
             ON CONFLICT (room_id) DO UPDATE SET personality = EXCLUDED.personality",
        )
        .bind(room)
        .bind(text)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_interject_odds(&self, room: &str) -> Result<f64> {
        let odds: Option<f64> =
            sqlx::query_scalar("SELECT interject_odds FROM room WHERE room_id = $1")
                .bind(room)
                .fetch_optional(&self.pool)
                .await?;
        Ok(odds.unwrap_or(0.0))
    }

    async fn set_interject_odds(&self, room: &str, odds: f64) -> Result<()> {
        sqlx::query(
            "INSERT INTO room (room_id, interject_odds) VALUES ($1, $2) \
             ON CONFLICT (room_id) DO UPDATE SET interject_odds = EXCLUDED.interject_odds",
        )
        .bind(room)
        .bind(odds)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_hide_in_threads(&self, room: &str) -> Result<bool> {
        let hide: Option<bool> =
            sqlx::query_scalar("SELECT hide_in_threads FROM room WHERE room_id = $1")
                .bind(room)
                .fetch_optional(&self.pool)
                .await?;
        Ok(hide.unwrap_or(false))
    }

    async fn toggle_hide_in_threads(&self, room: &str) -> Result<bool> {
        // A missing row starts from the column default (false), so the first
        // toggle stores true.
        let hide: bool = sqlx::query_scalar(
            "INSERT INTO room (room_id, hide_in_threads) VALUES ($1, TRUE) \
             ON CONFLICT (room_id) DO UPDATE SET hide_in_threads = NOT room.hide_in_threads \
             RETURNING hide_in_threads",
        )
        .bind(room)
        .fetch_one(&self.pool)
        .await?;
        Ok(hide)
    }

    async fn add_feed_subscription(&self, room: &str, url: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(UPSERT_ROOM).bind(room).execute(&mut *tx).await?;
        sqlx::query(
            "INSERT INTO rss_feed (url, last_update) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(url)
        .bind(Utc::now().timestamp())
        .execute(&mut *tx)
        .await?;
        let result = sqlx::query(
            "INSERT INTO rss_subscription (url, room_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(url)
        .bind(room)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove_feed_subscription(&self, room: &str, url: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM rss_subscription WHERE url = $1 AND room_id = $2")
            .bind(url)
            .bind(room)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_room_feeds(&self, room: &str) -> Result<Vec<String>> {
        let feeds = sqlx::query_scalar(
            "SELECT url FROM rss_subscription WHERE room_id = $1 ORDER BY url",
        )
        .bind(room)
        .fetch_all(&self.pool)
        .await?;
        Ok(feeds)
    }

    async fn list_rooms_for_feed(&self, url: &str) -> Result<Vec<String>> {
        let rooms = sqlx::query_scalar(
            "SELECT room_id FROM rss_subscription WHERE url = $1 ORDER BY room_id",
        )
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
        sqlx::query("UPDATE rss_feed SET last_update = $1 WHERE url = $2")
            .bind(at.timestamp())
            .bind(url)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_feed_display_name(&self, url: &str, name: &str) -> Result<()> {
        sqlx::query("UPDATE rss_feed SET display_name = $1 WHERE url = $2")
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
            "INSERT INTO greeting (id, greeting) VALUES (0, $1) \
             ON CONFLICT (id) DO UPDATE SET greeting = EXCLUDED.greeting",
        )
        .bind(text)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Needs a disposable database; run with
    /// `ROOMWARDEN_TEST_POSTGRES_URL=postgres://... cargo test -- --ignored`.
    #[tokio::test]
    #[ignore]
    async fn test_postgres_round_trip() {
        let Ok(url) = std::env::var("ROOMWARDEN_TEST_POSTGRES_URL") else {
            return;
        };
        let store = PostgresStore::connect(&url, 2).await.unwrap();
        assert_eq!(
            store.schema_version().await.unwrap(),
            POSTGRES_MIGRATIONS.len() as i64
        );

        let room = format!("!pg-test-{}:x", Utc::now().timestamp_nanos_opt().unwrap_or(0));
        store.set_room_admin(&room, "@alice:x").await.unwrap();
        assert!(store.is_room_admin(&room, "@alice:x").await.unwrap());
        assert!(store.toggle_hide_in_threads(&room).await.unwrap());
        assert!(!store.toggle_hide_in_threads(&room).await.unwrap());

        store.set_interject_odds(&room, 0.5).await.unwrap();
        assert_eq!(store.get_interject_odds(&room).await.unwrap(), 0.5);

        let feed = format!("https://example.com/{room}.xml");
        assert!(store.add_feed_subscription(&room, &feed).await.unwrap());
        assert!(!store.add_feed_subscription(&room, &feed).await.unwrap());
        assert_eq!(store.list_rooms_for_feed(&feed).await.unwrap(), vec![room.clone()]);
        assert!(store.remove_feed_subscription(&room, &feed).await.unwrap());
        assert!(store.remove_room_admin(&room, "@alice:x").await.unwrap());
    }
}
