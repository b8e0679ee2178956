/*
[INPUT]:  Error sources (HTTP, API status, serialization, WebSocket, config)
[OUTPUT]: Structured error types shared by transports, cache and datafeed
[POS]:    Error handling layer - unified error types for entire crate
[UPDATE]: When adding new error sources or improving error messages
*/

use reqwest::StatusCode;
use thiserror::Error;

use crate::cache::FetchError;

/// Main error type for the chartfeed adapter
#[derive(Error, Debug)]
pub enum ChartfeedError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned a non-success status
    #[error("API error (code {code}): {message}")]
    Api { code: i32, message: String },

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// URL parsing failed
    #[error("Invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Invalid response from server
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Caller passed something the remote cannot serve
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Cached fetch settled with an error
    #[error("Fetch failed: {0}")]
    Fetch(FetchError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ChartfeedError {
    /// HTTP status code carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            ChartfeedError::Api { code, .. } => u16::try_from(*code).ok(),
            ChartfeedError::Http(err) => err.status().map(|status| status.as_u16()),
            ChartfeedError::Fetch(err) => err.status,
            _ => None,
        }
    }

    /// Create an API error from status code and message
    pub fn api_error(status: StatusCode, message: impl Into<String>) -> Self {
        ChartfeedError::Api {
            code: status.as_u16() as i32,
            message: message.into(),
        }
    }
}

/// Result type alias for chartfeed operations
pub type Result<T> = std::result::Result<T, ChartfeedError>;
