//! roomwarden - room administration and feed subscriptions for a chat bot.
//!
//! The crate keeps per-room settings and admins in a SQL store, runs admin
//! commands typed into rooms, and polls RSS/Atom feeds to notify subscribed
//! rooms of new entries. Chat transport and text generation stay outside,
//! behind the traits in [`transport`] and the [`bot::CompletionRequest`]
//! hand-off.

pub mod auth;
pub mod bot;
pub mod command;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod logging;
pub mod rss;
pub mod transport;

pub use auth::{AccessLevel, Authorizer, PermissionError};
pub use bot::{Bot, CompletionRequest};
pub use command::{Command, CommandProcessor, Reply};
pub use config::{Config, DatabaseBackend};
pub use context::BotContext;
#[cfg(feature = "postgres")]
pub use db::PostgresStore;
#[cfg(feature = "sqlite")]
pub use db::SqliteStore;
pub use db::{FeedInfo, SettingsStore};
pub use error::{BotError, Result};
pub use rss::{FeedPoller, FeedSource, HttpFeedSource, PollReport, PollerConfig, PollerHandle};
pub use transport::{InboundMessage, MembershipLookup, Notifier, OutgoingMessage};
