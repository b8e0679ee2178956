/*
[INPUT]:  Fetch outcomes from the HTTP transport
[OUTPUT]: CacheEntry snapshots delivered to cache subscribers
[POS]:    Cache layer - per-key request state
[UPDATE]: When adding entry flags or changing emptiness rules
*/

use std::fmt;

use serde_json::Value;
use tokio::time::Instant;

use crate::http::{ChartfeedError, Result};

/// Failure captured into a cache entry instead of being returned to callers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    pub message: String,
    pub status: Option<u16>,
}

impl From<&ChartfeedError> for FetchError {
    fn from(err: &ChartfeedError) -> Self {
        Self {
            message: err.to_string(),
            status: err.status(),
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} (status {})", self.message, status),
            None => f.write_str(&self.message),
        }
    }
}

/// State of one cached request
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub loading: bool,
    pub has_error: bool,
    pub response: Option<Value>,
    pub error: Option<FetchError>,
    pub is_empty: bool,
    pub calling: bool,
    pub updated_at: Instant,
}

impl CacheEntry {
    /// First fetch for a key is running
    pub fn pending() -> Self {
        Self {
            loading: true,
            has_error: false,
            response: None,
            error: None,
            is_empty: false,
            calling: true,
            updated_at: Instant::now(),
        }
    }

    pub fn success(response: Value) -> Self {
        Self {
            loading: false,
            has_error: false,
            is_empty: is_empty_value(&response),
            response: Some(response),
            error: None,
            calling: false,
            updated_at: Instant::now(),
        }
    }

    pub fn failure(error: FetchError) -> Self {
        Self {
            loading: false,
            has_error: true,
            response: None,
            error: Some(error),
            is_empty: false,
            calling: false,
            updated_at: Instant::now(),
        }
    }

    /// Stale entry being refetched; the last response stays visible.
    pub fn revalidating(&self) -> Self {
        Self {
            loading: self.loading,
            has_error: false,
            response: self.response.clone(),
            error: None,
            is_empty: false,
            calling: true,
            updated_at: Instant::now(),
        }
    }

    /// Outcome of a settled entry: the response, or the stored error.
    pub fn into_result(self) -> Result<Value> {
        match (self.error, self.response) {
            (Some(error), _) => Err(ChartfeedError::Fetch(error)),
            (None, Some(response)) => Ok(response),
            (None, None) => Ok(Value::Null),
        }
    }
}

/// Empty array or object without keys
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
