//! Reconnect backoff configuration

use serde::Deserialize;
use std::time::Duration;

use super::serde_utils::duration_secs;
use crate::error::ConfigError;

/// Exponential backoff configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Initial delay
    #[serde(with = "duration_secs")]
    pub initial: Duration,

    /// Maximum delay
    #[serde(with = "duration_secs")]
    pub max: Duration,

    /// Multiplier for each retry
    pub multiplier: f64,

    /// Jitter factor (0.0 to 1.0)
    pub jitter: f64,

    /// Give up after this many consecutive failed attempts (None = never)
    pub max_attempts: Option<u32>,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: 0.25,
            max_attempts: None,
        }
    }
}

impl BackoffConfig {
    /// Reject values the backoff arithmetic cannot use
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "backoff.multiplier must be a finite number of at least 1, got {}",
                self.multiplier
            )));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(ConfigError::Invalid(format!(
                "backoff.jitter must be between 0 and 1, got {}",
                self.jitter
            )));
        }
        if self.initial > self.max {
            return Err(ConfigError::Invalid(format!(
                "backoff.initial ({}s) exceeds backoff.max ({}s)",
                self.initial.as_secs(),
                self.max.as_secs()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> BackoffConfig {
        toml::from_str(toml).unwrap()
    }

    #[test]
    fn test_default_is_valid() {
        assert!(BackoffConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_multiplier() {
        assert!(parse("multiplier = 0.5").validate().is_err());
        assert!(parse("multiplier = inf").validate().is_err());
        assert!(parse("multiplier = nan").validate().is_err());
    }

    #[test]
    fn test_rejects_bad_jitter() {
        assert!(parse("jitter = nan").validate().is_err());
        assert!(parse("jitter = 1.5").validate().is_err());
        assert!(parse("jitter = -0.1").validate().is_err());
        assert!(parse("jitter = 1.0").validate().is_ok());
    }

    #[test]
    fn test_rejects_initial_above_max() {
        let err = parse("initial = 120\nmax = 60").validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("backoff.initial")));
    }
}
