//! Error types for quotecast.

/// Top-level error type for the bot.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Persistence errors.
///
/// `NotFound` is distinguishable from connection/query failures so callers
/// can treat "no such row" differently from "store unavailable" (a missing
/// quote skips one firing; a dead store re-renders a retry notice).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Transport (Telegram gateway) errors.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to send message to chat {chat}: {reason}")]
    SendFailed { chat: i64, reason: String },

    #[error("Failed to edit message {message} in chat {chat}: {reason}")]
    EditFailed {
        chat: i64,
        message: i64,
        reason: String,
    },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Malformed update: {0}")]
    InvalidUpdate(String),
}

/// Scheduler errors.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Invalid delivery schedule: {0}")]
    InvalidSchedule(String),
}

/// Result type alias for the bot.
pub type Result<T> = std::result::Result<T, Error>;
