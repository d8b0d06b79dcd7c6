//! Weather acquisition error types.

use std::time::Duration;

use thiserror::Error;

/// Failure of a single upstream attempt.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    /// Upstream throttled this client (HTTP 429)
    #[error("Rate limited by weather provider")]
    RateLimited { retry_after: Option<Duration> },

    /// Transport failure: DNS, connect, TLS, timeout, truncated body
    #[error("Network error: {0}")]
    Network(String),

    /// Non-success, non-throttle response, or a body that failed to decode
    #[error("Upstream error ({}): {message}", status_label(.status))]
    Upstream { status: Option<u16>, message: String },
}

/// Errors surfaced to callers of `WeatherClient`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WeatherError {
    #[error("Rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Upstream error ({}): {message}", status_label(.status))]
    Upstream { status: Option<u16>, message: String },

    #[error("Invalid location: {0}")]
    InvalidLocation(String),

    #[error("Weather scheduler is not running")]
    Unavailable,

    /// The queued lookup panicked; the queue itself is still running
    #[error("Weather lookup failed unexpectedly")]
    Internal,
}

impl WeatherError {
    /// Convert the last failed attempt into the caller-facing error.
    pub fn from_attempt(error: FetchError, attempts: u32) -> Self {
        match error {
            FetchError::RateLimited { .. } => Self::RateLimited { attempts },
            FetchError::Network(msg) => Self::Network(msg),
            FetchError::Upstream { status, message } => Self::Upstream { status, message },
        }
    }

    /// User-friendly error message for UI display.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "Weather data temporarily unavailable, retry shortly.",
            Self::Network(_) => "Unable to reach the weather service. Check your connection.",
            Self::Upstream { status: Some(s), .. } if *s >= 500 => {
                "The weather service is experiencing issues. Please try again later."
            }
            Self::Upstream { .. } => "The weather service rejected the request.",
            Self::InvalidLocation(_) => "Location coordinates are invalid. Check the location settings.",
            Self::Unavailable => "Weather service is shutting down.",
            Self::Internal => "Weather lookup failed unexpectedly. Please try again.",
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Whether the condition is expected to clear on its own.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Network(_) => true,
            Self::Upstream { status, .. } => status.is_some_and(|s| s >= 500),
            Self::InvalidLocation(_) | Self::Unavailable | Self::Internal => false,
        }
    }
}

fn status_label(status: &Option<u16>) -> String {
    match status {
        Some(code) => code.to_string(),
        None => "no status".to_string(),
    }
}

/// Durable medium failures. Always logged and swallowed by the cache layer.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
