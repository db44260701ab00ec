//! Shared deserialization utilities for configuration

/// Helper module for Duration fields written as seconds
///
/// Durations are read from a u64 number of seconds, which reads naturally
/// in TOML configuration files.
pub mod duration_secs {
    use serde::{self, Deserialize, Deserializer};
    use std::time::Duration;

    /// Deserialize a Duration from seconds (u64)
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Same as [`duration_secs`] for optional durations
pub mod option_duration_secs {
    use serde::{self, Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::time::Duration;

    #[derive(Debug, PartialEq, Deserialize)]
    struct TestConfig {
        #[serde(with = "duration_secs")]
        timeout: Duration,
        #[serde(default, with = "option_duration_secs")]
        limit: Option<Duration>,
    }

    #[test]
    fn test_duration_secs_deserialize() {
        let config: TestConfig = toml::from_str("timeout = 60\nlimit = 5").unwrap();
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.limit, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_option_duration_missing_field() {
        let config: TestConfig = toml::from_str("timeout = 1").unwrap();
        assert_eq!(config.limit, None);
    }

    #[test]
    fn test_negative_duration_rejected() {
        assert!(toml::from_str::<TestConfig>("timeout = -1").is_err());
    }
}
