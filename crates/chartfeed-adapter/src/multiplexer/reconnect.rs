/*
[INPUT]:  Reconnect configuration and connection outcomes
[OUTPUT]: Bounded, jittered delays between connection attempts
[POS]:    Multiplexer - reconnect state machine support
[UPDATE]: When changing backoff shape, floor or attempt limits
*/

use std::time::Duration;

use rand::Rng;

/// Lower bound for any reconnect delay
pub const MIN_RECONNECT_DELAY: Duration = Duration::from_millis(500);

/// Configuration for reconnection behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before the first attempt after a drop.
    pub initial_delay: Duration,
    /// Cap on the delay between attempts.
    pub max_delay: Duration,
    /// Growth factor applied after each failed attempt.
    pub multiplier: f64,
    /// Jitter as a fraction of the delay (0.1 = ±10%).
    pub jitter_factor: f64,
    /// Attempts before giving up (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_factor: 0.1,
            max_attempts: 0,
        }
    }
}

/// Exponential backoff with jitter, reset on every successful open.
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    current_delay: Duration,
    attempt_count: u32,
}

impl ReconnectPolicy {
    pub fn new(config: ReconnectConfig) -> Self {
        let current_delay = config.initial_delay;
        Self {
            config,
            current_delay,
            attempt_count: 0,
        }
    }

    /// Next delay, or `None` once `max_attempts` is exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.config.max_attempts > 0 && self.attempt_count >= self.config.max_attempts {
            return None;
        }
        self.attempt_count += 1;

        let delay = self.apply_jitter(self.current_delay);

        let grown = self.current_delay.mul_f64(self.config.multiplier.max(1.0));
        self.current_delay = grown.min(self.config.max_delay);

        Some(delay.clamp(MIN_RECONNECT_DELAY, self.config.max_delay.max(MIN_RECONNECT_DELAY)))
    }

    pub fn reset(&mut self) {
        self.current_delay = self.config.initial_delay;
        self.attempt_count = 0;
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    fn apply_jitter(&self, delay: Duration) -> Duration {
        let jitter = self.config.jitter_factor.clamp(0.0, 1.0);
        if jitter == 0.0 {
            return delay;
        }
        let factor = rand::thread_rng().gen_range(1.0 - jitter..=1.0 + jitter);
        delay.mul_f64(factor)
    }
}
