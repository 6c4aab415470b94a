//! Error types for roomwarden.

use thiserror::Error;

use crate::auth::PermissionError;

/// Common error type for roomwarden.
#[derive(Error, Debug)]
pub enum BotError {
    /// Database error.
    ///
    /// Any query that fails after the store has been opened. Errors from sqlx
    /// are converted automatically.
    #[error("database error: {0}")]
    Database(String),

    /// Database connection error. Fatal at startup.
    #[error("database connection error: {0}")]
    DatabaseConnection(String),

    /// A schema migration could not be applied. Fatal at startup.
    #[error("migration to version {version} failed: {message}")]
    Migration { version: i64, message: String },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The sender lacks the rights for a command.
    #[error("permission denied: {0}")]
    Permission(#[from] PermissionError),

    /// Validation error for user input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Feed fetch, parse or timeout error.
    #[error("feed error: {0}")]
    Feed(String),

    /// Chat transport failure (membership lookup, message delivery).
    #[error("transport error: {0}")]
    Transport(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<sqlx::Error> for BotError {
    fn from(e: sqlx::Error) -> Self {
        BotError::Database(e.to_string())
    }
}

/// Result type alias for roomwarden operations.
pub type Result<T> = std::result::Result<T, BotError>;
