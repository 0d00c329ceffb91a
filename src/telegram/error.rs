//! Telegram Bot API error types

use std::time::Duration;
use thiserror::Error;

/// Bot API error with classification
#[derive(Debug, Error)]
#[error("{message}")]
pub struct TelegramError {
    pub kind: TelegramErrorKind,
    pub message: String,
    pub retry_after: Option<Duration>,
}

impl TelegramError {
    pub fn new(kind: TelegramErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    #[must_use]
    pub fn with_retry_after(mut self, duration: Duration) -> Self {
        self.retry_after = Some(duration);
        self
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(TelegramErrorKind::Network, message)
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::new(TelegramErrorKind::RateLimit, message)
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(TelegramErrorKind::ServerError, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(TelegramErrorKind::Auth, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(TelegramErrorKind::InvalidRequest, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(TelegramErrorKind::Unknown, message)
    }

    /// Classify an unsuccessful Bot API answer by its error code
    pub fn from_api(error_code: u16, description: &str, retry_after: Option<u64>) -> Self {
        match error_code {
            401 | 403 | 404 => Self::auth(format!("Unauthorized: {description}")),
            429 => {
                let err = Self::rate_limit(format!("Rate limited: {description}"));
                match retry_after {
                    Some(secs) => err.with_retry_after(Duration::from_secs(secs)),
                    None => err,
                }
            }
            400 => Self::invalid_request(format!("Bad request: {description}")),
            // Another getUpdates consumer (or a webhook) is active
            409 => Self::invalid_request(format!("Conflict: {description}")),
            500..=599 => Self::server_error(format!("Server error: {description}")),
            _ => Self::unknown(format!("HTTP {error_code}: {description}")),
        }
    }
}

/// Error classification for retry logic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelegramErrorKind {
    /// Network issues, timeouts - retryable
    Network,
    /// Rate limited (429) - retryable after `retry_after`
    RateLimit,
    /// Server error (5xx) - retryable
    ServerError,
    /// Bad or revoked token - not retryable
    Auth,
    /// Bad request (400, 409) - not retryable
    InvalidRequest,
    /// Unknown error
    Unknown,
}

impl TelegramErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Network | Self::RateLimit | Self::ServerError)
    }
}
