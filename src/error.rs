// src/error.rs

//! Unified error handling for the crawler.
//!
//! Two layers of errors exist:
//! - [`AppError`] for request-level and infrastructure failures.
//! - [`FetchError`] for the outcome of a single fetcher run. These never
//!   escape a worker unit; they end up as diagnostics in the execution stats.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for crawler operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Proxy definition or pool error
    #[error("Proxy error: {0}")]
    Proxy(String),

    /// No registered fetcher can serve the request
    #[error("No eligible fetchers for '{keyword}' in '{location}'")]
    NoEligibleFetchers { keyword: String, location: String },
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a proxy error.
    pub fn proxy(message: impl Into<String>) -> Self {
        Self::Proxy(message.into())
    }
}

/// Failure of a single fetcher run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Soft anti-bot signal (403, CAPTCHA, anomaly banner)
    #[error("blocked: {0}")]
    Blocked(String),

    /// Explicit throttling signal (429, quota headers)
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Deadline exceeded
    #[error("timed out: {0}")]
    Timeout(String),

    /// Malformed source response
    #[error("parse failure: {0}")]
    ParseFailure(String),

    /// Fetcher disabled or misconfigured
    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl FetchError {
    pub fn blocked(reason: impl Into<String>) -> Self {
        Self::Blocked(reason.into())
    }

    pub fn rate_limited(reason: impl Into<String>) -> Self {
        Self::RateLimited(reason.into())
    }

    pub fn timeout(reason: impl Into<String>) -> Self {
        Self::Timeout(reason.into())
    }

    pub fn parse(reason: impl Into<String>) -> Self {
        Self::ParseFailure(reason.into())
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable(reason.into())
    }

    /// The discriminant without its payload.
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::Blocked(_) => FetchErrorKind::Blocked,
            FetchError::RateLimited(_) => FetchErrorKind::RateLimited,
            FetchError::Timeout(_) => FetchErrorKind::Timeout,
            FetchError::ParseFailure(_) => FetchErrorKind::ParseFailure,
            FetchError::Unavailable(_) => FetchErrorKind::Unavailable,
        }
    }

    /// Whether rotating the egress identity and trying again can help.
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

/// Serializable error classification used in execution stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    Blocked,
    RateLimited,
    Timeout,
    ParseFailure,
    Unavailable,
}

impl FetchErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            FetchErrorKind::Blocked | FetchErrorKind::RateLimited | FetchErrorKind::Timeout
        )
    }
}
