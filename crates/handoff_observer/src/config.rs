//! Configuration for the handoff observer.

use handoff_protocol::DEFAULT_HANDOFF_PREFIX;
use std::time::Duration;

/// Default maximum number of compaction generations walked per event.
pub const DEFAULT_MAX_LINEAGE_DEPTH: usize = 1024;

/// Configuration for the handoff observer.
#[derive(Debug, Clone)]
pub struct ObserverConfig {
    /// Period of the processing loop.
    pub check_interval: Duration,
    /// Key prefix under which handoff events are persisted.
    pub handoff_prefix: String,
    /// When false, every event is rejected and deleted without swapping.
    pub auto_handoff: bool,
    /// Upper bound on compaction generations walked for one event.
    pub max_lineage_depth: usize,
    /// Retry behavior for the initial per-collection load.
    pub retry: RetryConfig,
}

impl ObserverConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self {
            check_interval: Duration::from_secs(1),
            handoff_prefix: DEFAULT_HANDOFF_PREFIX.to_string(),
            auto_handoff: true,
            max_lineage_depth: DEFAULT_MAX_LINEAGE_DEPTH,
            retry: RetryConfig::default(),
        }
    }

    /// Sets the processing loop period.
    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    /// Sets the event key prefix.
    pub fn with_handoff_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.handoff_prefix = prefix.into();
        self
    }

    /// Enables or disables automatic handoff.
    pub fn with_auto_handoff(mut self, enabled: bool) -> Self {
        self.auto_handoff = enabled;
        self
    }

    /// Sets the lineage depth bound.
    pub fn with_max_lineage_depth(mut self, depth: usize) -> Self {
        self.max_lineage_depth = depth;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Disables jitter.
    pub fn without_jitter(mut self) -> Self {
        self.add_jitter = false;
        self
    }

    /// Calculates the delay before a given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_delay = self.initial_delay.as_secs_f64()
            * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        let delay_secs = base_delay.min(self.max_delay.as_secs_f64());

        if self.add_jitter {
            // Up to 25% extra.
            let jitter = delay_secs * 0.25 * clock_jitter();
            Duration::from_secs_f64(delay_secs + jitter)
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Pseudo-random value in `[0, 1)` taken from the clock.
fn clock_jitter() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    f64::from(nanos % 1000) / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observer_config_defaults() {
        let config = ObserverConfig::default();
        assert_eq!(config.check_interval, Duration::from_secs(1));
        assert_eq!(config.handoff_prefix, "querycoord-handoff");
        assert!(config.auto_handoff);
        assert_eq!(config.max_lineage_depth, 1024);
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn observer_config_builder() {
        let config = ObserverConfig::new()
            .with_check_interval(Duration::from_millis(10))
            .with_handoff_prefix("h")
            .with_auto_handoff(false)
            .with_max_lineage_depth(4)
            .with_retry(RetryConfig::no_retry());

        assert_eq!(config.check_interval, Duration::from_millis(10));
        assert_eq!(config.handoff_prefix, "h");
        assert!(!config.auto_handoff);
        assert_eq!(config.max_lineage_depth, 4);
        assert_eq!(config.retry.max_attempts, 1);
    }

    #[test]
    fn retry_delay_backs_off() {
        let config = RetryConfig::new(5)
            .with_initial_delay(Duration::from_millis(100))
            .without_jitter();

        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(400));
    }

    #[test]
    fn retry_delay_jitter_is_bounded() {
        let config = RetryConfig::new(3).with_initial_delay(Duration::from_millis(100));
        let delay = config.delay_for_attempt(1);
        assert!(delay >= Duration::from_millis(100));
        assert!(delay <= Duration::from_millis(125));
    }

    #[test]
    fn retry_delay_respects_max() {
        let config = RetryConfig::new(10)
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5))
            .with_backoff_multiplier(10.0);

        assert!(config.delay_for_attempt(5) <= Duration::from_millis(6250));
    }
}
