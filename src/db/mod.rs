//! Database module for roomwarden.
//!
//! The [`SettingsStore`] trait is the only way the rest of the crate touches
//! persisted state. Each backend implements it with its own native parameter
//! binding and its own migration list.
//!
//! Every mutating call commits before it returns. Writing a room-scoped
//! setting creates the room row first if it is missing.

#[cfg(feature = "postgres")]
mod postgres;
mod schema;
#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;
pub use schema::{POSTGRES_MIGRATIONS, SQLITE_MIGRATIONS};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::Result;

/// A feed with at least one subscribed room.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedInfo {
    /// Feed URL (unique).
    pub url: String,
    /// Entries published at or before this instant have been delivered.
    pub last_update: DateTime<Utc>,
    /// Cached feed title, filled in after the first successful fetch.
    pub display_name: Option<String>,
}

impl FeedInfo {
    /// Name shown in notifications, falling back to the URL.
    pub fn name(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.url)
    }
}

/// Row type shared by both backends for `list_all_feeds`.
#[derive(Debug, Clone, sqlx::FromRow)]
struct FeedRow {
    url: String,
    last_update: i64,
    display_name: Option<String>,
}

impl From<FeedRow> for FeedInfo {
    fn from(row: FeedRow) -> Self {
        FeedInfo {
            url: row.url,
            last_update: from_unix(row.last_update),
            display_name: row.display_name,
        }
    }
}

/// Convert stored Unix seconds back to a UTC timestamp.
fn from_unix(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

/// Persistent storage for rooms, admins, subscriptions and room settings.
///
/// Removing a relation that does not exist is a successful no-op; the
/// returned `bool` tells whether a row was actually removed.
pub trait SettingsStore: Send + Sync + Clone + 'static {
    /// Backend name for logging.
    fn backend_name(&self) -> &'static str;

    /// Make `user` an admin of `room`. Adding an existing admin is a no-op.
    fn set_room_admin(&self, room: &str, user: &str) -> impl Future<Output = Result<()>> + Send;

    /// Remove `user` from the admins of `room`.
    fn remove_room_admin(
        &self,
        room: &str,
        user: &str,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Admins of `room`, sorted by user ID.
    fn list_room_admins(&self, room: &str) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Whether `user` is a stored admin of `room`. Super-admins are not known
    /// here; see [`crate::auth::Authorizer::is_admin`].
    fn is_room_admin(&self, room: &str, user: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Custom personality of `room`, or an empty string when none is set.
    fn get_personality(&self, room: &str) -> impl Future<Output = Result<String>> + Send;

    /// Overwrite the personality of `room`.
    fn set_personality(&self, room: &str, text: &str) -> impl Future<Output = Result<()>> + Send;

    /// Interjection probability of `room` in `[0, 1]`, 0 when unset.
    fn get_interject_odds(&self, room: &str) -> impl Future<Output = Result<f64>> + Send;

    /// Set the interjection probability of `room`.
    fn set_interject_odds(&self, room: &str, odds: f64)
        -> impl Future<Output = Result<()>> + Send;

    /// Whether unprompted replies are hidden in threads for `room`.
    fn get_hide_in_threads(&self, room: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Flip the hide-in-threads flag and return the new value.
    fn toggle_hide_in_threads(&self, room: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Subscribe `room` to `url`. A feed row seen for the first time gets
    /// the current time as its watermark. Returns `false` when the room was
    /// already subscribed.
    fn add_feed_subscription(
        &self,
        room: &str,
        url: &str,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Unsubscribe `room` from `url`. The feed row is kept.
    fn remove_feed_subscription(
        &self,
        room: &str,
        url: &str,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Feed URLs `room` is subscribed to, sorted.
    fn list_room_feeds(&self, room: &str) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Rooms subscribed to `url`, sorted.
    fn list_rooms_for_feed(&self, url: &str) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Every feed with at least one subscription, each listed once.
    fn list_all_feeds(&self) -> impl Future<Output = Result<Vec<FeedInfo>>> + Send;

    /// Store the watermark of `url` (whole seconds).
    fn set_feed_watermark(
        &self,
        url: &str,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Store the display name of `url`.
    fn set_feed_display_name(
        &self,
        url: &str,
        name: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// The stored greeting, if one was ever set.
    fn get_greeting(&self) -> impl Future<Output = Result<Option<String>>> + Send;

    /// Overwrite the greeting.
    fn set_greeting(&self, text: &str) -> impl Future<Output = Result<()>> + Send;
}
