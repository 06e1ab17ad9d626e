//! Request queue configuration

use crate::error::{OfflineError, Result};
use std::time::Duration;

/// Exponential backoff between retries of a queued request.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Delay after the first failure (default: 1s)
    pub base_delay: Duration,
    /// Upper bound for any delay (default: 60s)
    pub max_delay: Duration,
    /// Growth factor per failure (default: 2.0)
    pub multiplier: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
        }
    }
}

impl BackoffPolicy {
    /// Delay before the next attempt once `retry_count` failures have been
    /// recorded: `base * multiplier^(retry_count - 1)`, capped at `max_delay`.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let exponent = retry_count.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.multiplier.powi(exponent);
        let millis = self.base_delay.as_millis() as f64 * factor;
        let max_millis = self.max_delay.as_millis() as f64;
        if !millis.is_finite() || millis >= max_millis {
            self.max_delay
        } else {
            Duration::from_millis(millis as u64)
        }
    }
}

/// Configuration for [`RequestQueue`](crate::RequestQueue).
#[derive(Debug, Clone, PartialEq)]
pub struct QueueConfig {
    /// Connectivity failures tolerated before a request is dropped (default: 3)
    pub max_retries: u32,

    pub backoff: BackoffPolicy,

    /// Timeout applied to requests that carry none (default: 10s)
    pub default_timeout: Duration,

    /// Interval between scans for requests whose backoff elapsed (default: 30s)
    pub drain_interval: Duration,

    /// Maximum pending requests (default: 200)
    pub max_queue_len: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: BackoffPolicy::default(),
            default_timeout: Duration::from_secs(10),
            drain_interval: Duration::from_secs(30),
            max_queue_len: 200,
        }
    }
}

impl QueueConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_drain_interval(mut self, interval: Duration) -> Self {
        self.drain_interval = interval;
        self
    }

    pub fn with_max_queue_len(mut self, max_queue_len: usize) -> Self {
        self.max_queue_len = max_queue_len;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_queue_len == 0 {
            return Err(OfflineError::InvalidConfig(
                "max_queue_len must be at least 1".to_string(),
            ));
        }

        if self.default_timeout.is_zero() {
            return Err(OfflineError::InvalidConfig(
                "default_timeout must be greater than zero".to_string(),
            ));
        }

        if self.drain_interval.is_zero() {
            return Err(OfflineError::InvalidConfig(
                "drain_interval must be greater than zero".to_string(),
            ));
        }

        if self.backoff.base_delay > self.backoff.max_delay {
            return Err(OfflineError::InvalidConfig(format!(
                "backoff base_delay ({:?}) exceeds max_delay ({:?})",
                self.backoff.base_delay, self.backoff.max_delay
            )));
        }

        if self.backoff.multiplier.is_nan() || self.backoff.multiplier < 1.0 {
            return Err(OfflineError::InvalidConfig(
                "backoff multiplier must be at least 1.0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(QueueConfig::default().validate().is_ok());
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let backoff = BackoffPolicy::default();
        assert_eq!(backoff.delay_for(1), Duration::from_secs(1));
        assert_eq!(backoff.delay_for(2), Duration::from_secs(2));
        assert_eq!(backoff.delay_for(4), Duration::from_secs(8));
        assert_eq!(backoff.delay_for(7), Duration::from_secs(60));
        assert_eq!(backoff.delay_for(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn test_invalid_configs_rejected() {
        assert!(QueueConfig::new().with_max_queue_len(0).validate().is_err());
        assert!(QueueConfig::new()
            .with_default_timeout(Duration::ZERO)
            .validate()
            .is_err());
        assert!(QueueConfig::new()
            .with_backoff(BackoffPolicy {
                base_delay: Duration::from_secs(120),
                ..BackoffPolicy::default()
            })
            .validate()
            .is_err());
        assert!(QueueConfig::new()
            .with_backoff(BackoffPolicy {
                multiplier: f64::NAN,
                ..BackoffPolicy::default()
            })
            .validate()
            .is_err());
    }
}
