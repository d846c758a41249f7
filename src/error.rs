//! Custom error types for litscout.
//!
//! This module defines all error types used throughout the engine.
//! All fallible functions return `Result<T, DiscoveryError>` instead of using `unwrap()`.

use thiserror::Error;

/// Main error type for literature discovery operations.
///
/// Uses `thiserror` for ergonomic error handling and automatic `Display` implementation.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Network/HTTP request error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Response parsing error (JSON, Atom XML, per-record extraction)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Rate limited by external API
    #[error("Rate limited, retry after {0}s")]
    RateLimited(u64),

    /// External API returned an error
    #[error("API error: {code} - {message}")]
    Api {
        /// Error code from API
        code: i32,
        /// Error message from API
        message: String,
    },

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Relational store error
    #[error("Database error: {0}")]
    Sql(#[from] rusqlite::Error),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// Invalid input rejected before any work was done
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result type alias using `DiscoveryError`
pub type Result<T> = std::result::Result<T, DiscoveryError>;

/// Extension trait for adding context to Option types
pub trait OptionExt<T> {
    /// Convert Option to Result with a parse error message
    fn ok_or_parse(self, msg: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_parse(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| DiscoveryError::Parse(msg.to_string()))
    }
}
