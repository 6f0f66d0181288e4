// ABOUTME: Exponential reconnect backoff with a floor, a ceiling, and random jitter.
// ABOUTME: The base wait doubles after each failure and resets once a stream opens.

use std::time::Duration;

use rand::Rng;

/// Reconnect delay policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Base wait after the first failure.
    pub floor: Duration,
    /// Upper bound for the base wait.
    pub ceiling: Duration,
    /// Random extra wait, drawn from `[0, max_jitter)`.
    pub max_jitter: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            floor: Duration::from_millis(1000),
            ceiling: Duration::from_millis(10_000),
            max_jitter: Duration::from_millis(300),
        }
    }
}

/// Tracks the current base wait across consecutive connection failures.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    current: Duration,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        let current = config.floor.min(config.ceiling);
        Self { config, current }
    }

    /// Base wait that the next failure will use.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Return to the floor. Called when a stream opens successfully.
    pub fn reset(&mut self) {
        self.current = self.config.floor.min(self.config.ceiling);
    }

    /// Take the base wait for this failure and double it for the next one.
    pub fn next_base(&mut self) -> Duration {
        let base = self.current;
        self.current = base
            .checked_mul(2)
            .unwrap_or(self.config.ceiling)
            .min(self.config.ceiling);
        base
    }

    /// Base wait plus jitter for this failure.
    pub fn next_delay(&mut self) -> Duration {
        self.next_base() + self.jitter()
    }

    fn jitter(&self) -> Duration {
        let max_ms = self.config.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..max_ms))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}
