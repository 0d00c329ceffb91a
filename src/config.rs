//! Bot configuration from the environment

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_API_URL: &str = "https://api.telegram.org";
const DEFAULT_POLL_TIMEOUT_SECS: u64 = 30;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("TELEGRAM_BOT_TOKEN is not set")]
    MissingToken,
    #[error("TELEGRAM_POLL_TIMEOUT_SECS must be a whole number of seconds, got {0:?}")]
    InvalidPollTimeout(String),
}

/// Runtime configuration
#[derive(Clone)]
pub struct BotConfig {
    pub token: String,
    pub db_path: PathBuf,
    pub api_url: String,
    pub poll_timeout: Duration,
}

// Manual impl keeps the token out of logs
impl std::fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotConfig")
            .field("token", &"<redacted>")
            .field("db_path", &self.db_path)
            .field("api_url", &self.api_url)
            .field("poll_timeout", &self.poll_timeout)
            .finish()
    }
}

impl BotConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let token = var("TELEGRAM_BOT_TOKEN")
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(ConfigError::MissingToken)?;

        let db_path = var("STUDENT_BOT_DB_PATH").map_or_else(
            || {
                let home = var("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(format!("{home}/.student-bot/school_data.db"))
            },
            PathBuf::from,
        );

        let api_url = var("TELEGRAM_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let poll_timeout = match var("TELEGRAM_POLL_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidPollTimeout(raw.clone()))?,
            None => DEFAULT_POLL_TIMEOUT_SECS,
        };

        Ok(Self {
            token,
            db_path,
            api_url,
            poll_timeout: Duration::from_secs(poll_timeout),
        })
    }
}
