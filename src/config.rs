//! Configuration module for roomwarden.

use serde::Deserialize;
use std::path::Path;

use crate::{BotError, Result};

/// Environment variable that overrides `database.url`.
pub const DATABASE_URL_ENV: &str = "ROOMWARDEN_DATABASE_URL";

/// Bot identity and defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    /// Fully qualified user ID of the bot (`@name:domain`).
    pub user_id: String,
    /// Prefix that marks a message as a command. Defaults to `!<localpart>`.
    #[serde(default)]
    pub command_prefix: Option<String>,
    /// Default personality used when a room has no override.
    pub original_prompt: String,
    /// Default greeting used until one is stored.
    #[serde(default)]
    pub greeting: Option<String>,
    /// Users with admin rights in every room.
    #[serde(default)]
    pub super_admins: Vec<String>,
    /// Delay before greeting a room that invited the bot.
    #[serde(default = "default_greeting_delay")]
    pub greeting_delay_secs: u64,
}

fn default_greeting_delay() -> u64 {
    3
}

impl BotConfig {
    /// Local part of the bot's user ID (`@edu:example.org` -> `edu`).
    pub fn name(&self) -> &str {
        localpart(&self.user_id)
    }

    /// The effective command prefix.
    pub fn command_prefix(&self) -> String {
        match &self.command_prefix {
            Some(prefix) if !prefix.trim().is_empty() => prefix.trim().to_string(),
            _ => format!("!{}", self.name()),
        }
    }

    /// The effective default greeting.
    pub fn greeting(&self) -> String {
        match &self.greeting {
            Some(greeting) if !greeting.trim().is_empty() => greeting.clone(),
            _ => format!("Hi, my name is {}!", self.name()),
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL: `sqlite://<path>`, `sqlite::memory:` or `postgres://...`.
    #[serde(default = "default_db_url")]
    pub url: String,
    /// Maximum pooled connections.
    #[serde(default = "default_db_max_connections")]
    pub max_connections: u32,
}

fn default_db_url() -> String {
    "sqlite://data/roomwarden.db".to_string()
}

fn default_db_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_db_url(),
            max_connections: default_db_max_connections(),
        }
    }
}

/// Storage backend selected by the database URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseBackend {
    /// SQLite file path, or `None` for an in-memory database.
    Sqlite(Option<String>),
    /// PostgreSQL connection string.
    Postgres(String),
}

impl DatabaseBackend {
    /// Parse a connection URL.
    pub fn from_url(url: &str) -> Result<Self> {
        let url = url.trim();
        if url == "sqlite::memory:" {
            return Ok(DatabaseBackend::Sqlite(None));
        }
        if let Some(path) = url.strip_prefix("sqlite://") {
            if path.is_empty() {
                return Err(BotError::Config(
                    "database.url has an empty sqlite path".to_string(),
                ));
            }
            return Ok(DatabaseBackend::Sqlite(Some(path.to_string())));
        }
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            return Ok(DatabaseBackend::Postgres(url.to_string()));
        }
        Err(BotError::Config(format!(
            "database.url must start with sqlite:// or postgres://, got '{url}'"
        )))
    }

    /// Backend name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            DatabaseBackend::Sqlite(_) => "sqlite",
            DatabaseBackend::Postgres(_) => "postgres",
        }
    }
}

/// RSS polling configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RssConfig {
    /// Seconds between polling cycles.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Upper bound for fetching a single feed.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Maximum feed size in bytes.
    #[serde(default = "default_max_feed_size")]
    pub max_feed_size_bytes: u64,
    /// Maximum number of redirects.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    /// Feeds fetched concurrently within one cycle.
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,
    /// Allow loopback and private network hosts.
    #[serde(default)]
    pub allow_private_hosts: bool,
}

fn default_poll_interval() -> u64 {
    600 // 10 minutes
}

fn default_fetch_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_max_feed_size() -> u64 {
    5 * 1024 * 1024 // 5MB
}

fn default_max_redirects() -> usize {
    5
}

fn default_max_concurrent_fetches() -> usize {
    4
}

impl Default for RssConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            fetch_timeout_secs: default_fetch_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            max_feed_size_bytes: default_max_feed_size(),
            max_redirects: default_max_redirects(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
            allow_private_hosts: false,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Optional log file.
    #[serde(default)]
    pub file: Option<String>,
    /// Whether to log to stdout.
    #[serde(default = "default_console")]
    pub console: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_console() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
            console: default_console(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Bot identity and defaults.
    pub bot: BotConfig,
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// RSS configuration.
    #[serde(default)]
    pub rss: RssConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(BotError::Config(format!(
                "config file '{}' does not exist",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| BotError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `ROOMWARDEN_DATABASE_URL`: Override the database URL
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(DATABASE_URL_ENV) {
            if !url.is_empty() {
                self.database.url = url;
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if !is_valid_user_id(&self.bot.user_id) {
            return Err(BotError::Config(
                "bot.user_id must be in the form @name:domain".to_string(),
            ));
        }
        if let Some(bad) = self
            .bot
            .super_admins
            .iter()
            .find(|id| !is_valid_user_id(id))
        {
            return Err(BotError::Config(format!(
                "bot.super_admins entry '{bad}' must be in the form @name:domain"
            )));
        }
        if self.bot.original_prompt.trim().is_empty() {
            return Err(BotError::Config(
                "bot.original_prompt must not be empty".to_string(),
            ));
        }
        DatabaseBackend::from_url(&self.database.url)?;
        if self.database.max_connections == 0 {
            return Err(BotError::Config(
                "database.max_connections must be at least 1".to_string(),
            ));
        }
        if self.rss.poll_interval_secs == 0 || self.rss.fetch_timeout_secs == 0 {
            return Err(BotError::Config(
                "rss.poll_interval_secs and rss.fetch_timeout_secs must be positive".to_string(),
            ));
        }
        if self.rss.max_concurrent_fetches == 0 {
            return Err(BotError::Config(
                "rss.max_concurrent_fetches must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The storage backend named by `database.url`.
    pub fn database_backend(&self) -> Result<DatabaseBackend> {
        DatabaseBackend::from_url(&self.database.url)
    }
}

/// Check a user ID has the `@name:domain` shape.
pub fn is_valid_user_id(user_id: &str) -> bool {
    match user_id.strip_prefix('@') {
        Some(rest) => match rest.split_once(':') {
            Some((name, domain)) => !name.is_empty() && !domain.is_empty(),
            None => false,
        },
        None => false,
    }
}

/// Local part of a user ID, used as a display name.
pub fn localpart(user_id: &str) -> &str {
    let without_sigil = user_id.strip_prefix('@').unwrap_or(user_id);
    without_sigil
        .split_once(':')
        .map(|(name, _)| name)
        .unwrap_or(without_sigil)
}
