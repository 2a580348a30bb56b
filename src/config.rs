//! Configuration — assembled from environment variables at startup.

use std::path::PathBuf;

use crate::error::ConfigError;

/// Bot configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Telegram Bot API token.
    pub bot_token: String,
    /// Path to the local libSQL database file.
    pub db_path: PathBuf,
    /// Maximum number of words accepted in a feedback comment.
    pub comment_word_limit: usize,
    /// Long-poll timeout for getUpdates, in seconds.
    pub poll_timeout_secs: u64,
}

impl BotConfig {
    /// Build a config from the environment.
    ///
    /// `TELEGRAM_BOT_TOKEN` is required; everything else has a default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let bot_token = std::env::var("TELEGRAM_BOT_TOKEN")
            .map_err(|_| ConfigError::MissingEnvVar("TELEGRAM_BOT_TOKEN".into()))?;

        let db_path = std::env::var("QUOTECAST_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/quotecast.db"));

        let comment_word_limit = parse_env("QUOTECAST_COMMENT_WORD_LIMIT", 60)?;
        let poll_timeout_secs = parse_env("QUOTECAST_POLL_TIMEOUT_SECS", 30)?;

        Ok(Self {
            bot_token,
            db_path,
            comment_word_limit,
            poll_timeout_secs,
        })
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            db_path: PathBuf::from("./data/quotecast.db"),
            comment_word_limit: 60,
            poll_timeout_secs: 30,
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("cannot parse {raw:?}"),
        }),
        Err(_) => Ok(default),
    }
}
