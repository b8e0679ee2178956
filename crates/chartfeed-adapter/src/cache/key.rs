/*
[INPUT]:  Request descriptor (method, url, body, timeout, disable flag)
[OUTPUT]: Deterministic CacheKey fingerprint
[POS]:    Cache layer - cache table and single-flight key
[UPDATE]: When adding fields that identify a logical request
*/

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// HTTP method of a cached request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequestMethod {
    #[default]
    Get,
    Post,
}

impl RequestMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestMethod::Get => "GET",
            RequestMethod::Post => "POST",
        }
    }
}

impl fmt::Display for RequestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `METHOD:url:sha256(body):timeout_ms:disable`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(
        method: RequestMethod,
        url: &str,
        body: Option<&Value>,
        timeout: Duration,
        disable: bool,
    ) -> Self {
        let canonical = match body {
            Some(body) => canonicalize(body),
            None => Value::String(String::new()),
        };
        let digest = Sha256::digest(canonical.to_string().as_bytes());

        Self(format!(
            "{}:{}:{}:{}:{}",
            method,
            url,
            hex::encode(digest),
            timeout.as_millis(),
            disable
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Rebuild objects with keys in sorted order, recursively.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut sorted = Map::new();
            for (key, inner) in entries {
                sorted.insert(key.clone(), canonicalize(inner));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
