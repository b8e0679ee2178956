/*
[INPUT]:  YAML configuration file
[OUTPUT]: Parsed and validated datafeed configuration
[POS]:    Configuration layer - endpoints, timings and watch list
[UPDATE]: When adding new configuration options
*/

use std::time::Duration;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use chartfeed_adapter::{MultiplexerConfig, ReconnectConfig};

use crate::datafeed::DatafeedOptions;
use crate::resolution::interval_for;

/// Top-level configuration for the datafeed runner
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DatafeedConfig {
    /// REST host
    #[serde(default = "default_rest_base_url")]
    pub rest_base_url: String,
    /// Combined stream endpoint
    #[serde(default = "default_stream_url")]
    pub stream_url: String,
    #[serde(default)]
    pub debug: bool,
    /// Freshness window of cached REST responses
    #[serde(default = "default_cache_timeout_secs")]
    pub cache_timeout_secs: u64,
    /// Pace of outbound subscription messages
    #[serde(default = "default_send_interval_ms")]
    pub send_interval_ms: u64,
    #[serde(default)]
    pub reconnect: ReconnectSettings,
    /// Symbols to stream
    pub watch: Vec<WatchConfig>,
}

/// Reconnect backoff configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ReconnectSettings {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
    /// 0 retries forever
    #[serde(default)]
    pub max_attempts: u32,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            jitter_factor: default_jitter_factor(),
            max_attempts: 0,
        }
    }
}

/// One symbol to follow
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct WatchConfig {
    /// Trading symbol (e.g., "BTCUSDT")
    pub symbol: String,
    /// Chart resolution for live bars
    #[serde(default = "default_resolution")]
    pub resolution: String,
}

fn default_rest_base_url() -> String {
    chartfeed_adapter::http::client::DEFAULT_BASE_URL.to_string()
}

fn default_stream_url() -> String {
    chartfeed_adapter::ws::client::DEFAULT_STREAM_URL.to_string()
}

fn default_cache_timeout_secs() -> u64 {
    60
}

fn default_send_interval_ms() -> u64 {
    1000
}

fn default_initial_delay_ms() -> u64 {
    2000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_jitter_factor() -> f64 {
    0.1
}

fn default_resolution() -> String {
    "1".to_string()
}

impl DatafeedConfig {
    /// Load configuration from YAML file
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse and validate YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.watch.is_empty() {
            bail!("watch list is empty");
        }
        for entry in &self.watch {
            if entry.symbol.trim().is_empty() {
                bail!("watch entry with empty symbol");
            }
            if interval_for(&entry.resolution).is_none() {
                bail!("unsupported resolution {} for {}", entry.resolution, entry.symbol);
            }
        }

        if self.send_interval_ms == 0 {
            bail!("send_interval_ms must be positive");
        }
        if self.cache_timeout_secs == 0 {
            bail!("cache_timeout_secs must be positive");
        }

        let reconnect = &self.reconnect;
        if reconnect.initial_delay_ms == 0 || reconnect.max_delay_ms == 0 {
            bail!("reconnect delays must be positive");
        }
        if reconnect.initial_delay_ms > reconnect.max_delay_ms {
            bail!("reconnect initial_delay_ms exceeds max_delay_ms");
        }
        if reconnect.multiplier.is_nan() || reconnect.multiplier < 1.0 {
            bail!("reconnect multiplier must be at least 1");
        }
        if !(0.0..=1.0).contains(&reconnect.jitter_factor) {
            bail!("reconnect jitter_factor must be within [0, 1]");
        }
        Ok(())
    }

    pub fn multiplexer_config(&self) -> MultiplexerConfig {
        MultiplexerConfig {
            send_interval: Duration::from_millis(self.send_interval_ms),
            reconnect: ReconnectConfig {
                initial_delay: Duration::from_millis(self.reconnect.initial_delay_ms),
                max_delay: Duration::from_millis(self.reconnect.max_delay_ms),
                multiplier: self.reconnect.multiplier,
                jitter_factor: self.reconnect.jitter_factor,
                max_attempts: self.reconnect.max_attempts,
            },
        }
    }

    pub fn datafeed_options(&self) -> DatafeedOptions {
        DatafeedOptions {
            debug: self.debug,
            cache_timeout: Duration::from_secs(self.cache_timeout_secs),
        }
    }
}
