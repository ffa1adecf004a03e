//! Configuration management for bucketgate.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::error::{BucketgateError, Result};
use crate::ratelimit::{LeakyBucketLimiter, Strategy, TokenBucketLimiter};

/// Main configuration for bucketgate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BucketgateConfig {
    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,

    /// Limiter selection and parameters
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Demonstration driver settings
    #[serde(default)]
    pub demo: DemoConfig,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable output
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default level filter, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Limiter configuration, tagged by strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum LimiterConfig {
    /// Token bucket with background refill
    TokenBucket(TokenBucketConfig),
    /// Leaky bucket with lazy refill
    LeakyBucket(LeakyBucketConfig),
}

impl Default for LimiterConfig {
    fn default() -> Self {
        LimiterConfig::TokenBucket(TokenBucketConfig::default())
    }
}

impl LimiterConfig {
    /// Get the strategy this configuration selects.
    pub fn strategy(&self) -> Strategy {
        match self {
            LimiterConfig::TokenBucket(_) => Strategy::TokenBucket,
            LimiterConfig::LeakyBucket(_) => Strategy::LeakyBucket,
        }
    }

    /// Check the parameters the same way the limiter constructors do.
    pub fn validate(&self) -> Result<()> {
        match self {
            LimiterConfig::TokenBucket(cfg) => {
                TokenBucketLimiter::validate(cfg.capacity, cfg.refill_interval())
            }
            LimiterConfig::LeakyBucket(cfg) => {
                LeakyBucketLimiter::validate(cfg.capacity, cfg.leak_interval())
            }
        }
    }
}

/// Token bucket parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBucketConfig {
    /// Maximum tokens held at once
    #[serde(default = "default_capacity")]
    pub capacity: u64,

    /// Tokens added per tick
    #[serde(default = "default_refill_rate")]
    pub refill_rate: u64,

    /// Time between ticks in milliseconds
    #[serde(default = "default_refill_interval_ms")]
    pub refill_interval_ms: u64,
}

impl Default for TokenBucketConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            refill_rate: default_refill_rate(),
            refill_interval_ms: default_refill_interval_ms(),
        }
    }
}

impl TokenBucketConfig {
    /// Get the refill interval as a duration.
    pub fn refill_interval(&self) -> Duration {
        Duration::from_millis(self.refill_interval_ms)
    }
}

/// Leaky bucket parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeakyBucketConfig {
    /// Maximum credits held at once
    #[serde(default = "default_capacity")]
    pub capacity: u64,

    /// Time to earn back one credit in milliseconds
    #[serde(default = "default_leak_interval_ms")]
    pub leak_interval_ms: u64,
}

impl Default for LeakyBucketConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            leak_interval_ms: default_leak_interval_ms(),
        }
    }
}

impl LeakyBucketConfig {
    /// Get the leak interval as a duration.
    pub fn leak_interval(&self) -> Duration {
        Duration::from_millis(self.leak_interval_ms)
    }
}

fn default_capacity() -> u64 {
    5
}

fn default_refill_rate() -> u64 {
    2
}

fn default_refill_interval_ms() -> u64 {
    2000
}

fn default_leak_interval_ms() -> u64 {
    500
}

/// Demonstration driver settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemoConfig {
    /// Requests per run (sequential) or per burst (bursts)
    #[serde(default = "default_requests")]
    pub requests: u64,

    /// Delay before retrying a denied request in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Simulated work per admitted request in milliseconds
    #[serde(default = "default_work_ms")]
    pub work_ms: u64,

    /// Number of bursts
    #[serde(default = "default_bursts")]
    pub bursts: u64,

    /// Pause between bursts in milliseconds
    #[serde(default = "default_burst_pause_ms")]
    pub burst_pause_ms: u64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            requests: default_requests(),
            retry_delay_ms: default_retry_delay_ms(),
            work_ms: default_work_ms(),
            bursts: default_bursts(),
            burst_pause_ms: default_burst_pause_ms(),
        }
    }
}

fn default_requests() -> u64 {
    10
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_work_ms() -> u64 {
    1000
}

fn default_bursts() -> u64 {
    2
}

fn default_burst_pause_ms() -> u64 {
    500
}

/// Upper bound on `demo.requests`.
pub const MAX_DEMO_REQUESTS: u64 = 1_000_000;

/// Upper bound on `demo.bursts`.
pub const MAX_DEMO_BURSTS: u64 = 1_000;

impl DemoConfig {
    /// Check that a run stays within the driver's limits.
    pub fn validate(&self) -> Result<()> {
        if self.requests > MAX_DEMO_REQUESTS {
            return Err(BucketgateError::Config(format!(
                "demo.requests must be at most {}, got {}",
                MAX_DEMO_REQUESTS, self.requests
            )));
        }
        if self.bursts > MAX_DEMO_BURSTS {
            return Err(BucketgateError::Config(format!(
                "demo.bursts must be at most {}, got {}",
                MAX_DEMO_BURSTS, self.bursts
            )));
        }
        Ok(())
    }
}

impl BucketgateConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    ///
    /// The limiter and demo settings are validated before returning.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: BucketgateConfig = serde_yaml::from_str(yaml)
            .map_err(|e| BucketgateError::Config(format!("Failed to parse config: {}", e)))?;
        config.limiter.validate()?;
        config.demo.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BucketgateConfig::default();

        assert_eq!(config.log.level, "info");
        assert_eq!(config.log.format, LogFormat::Pretty);
        assert_eq!(
            config.limiter,
            LimiterConfig::TokenBucket(TokenBucketConfig {
                capacity: 5,
                refill_rate: 2,
                refill_interval_ms: 2000,
            })
        );
        assert_eq!(config.demo.requests, 10);
        assert_eq!(config.demo.bursts, 2);
    }

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config = BucketgateConfig::from_yaml("{}").unwrap();
        assert_eq!(config.limiter.strategy(), Strategy::TokenBucket);
        assert_eq!(config.demo, DemoConfig::default());
    }

    #[test]
    fn test_parse_token_bucket() {
        let yaml = r#"
log:
  level: debug
  format: json
limiter:
  strategy: token_bucket
  capacity: 10
  refill_rate: 3
  refill_interval_ms: 250
"#;
        let config = BucketgateConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.log.level, "debug");
        assert_eq!(config.log.format, LogFormat::Json);
        match config.limiter {
            LimiterConfig::TokenBucket(cfg) => {
                assert_eq!(cfg.capacity, 10);
                assert_eq!(cfg.refill_rate, 3);
                assert_eq!(cfg.refill_interval(), Duration::from_millis(250));
            }
            other => panic!("expected token bucket, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_leaky_bucket_with_partial_fields() {
        let yaml = r#"
limiter:
  strategy: leaky_bucket
  leak_interval_ms: 100
demo:
  bursts: 3
"#;
        let config = BucketgateConfig::from_yaml(yaml).unwrap();

        assert_eq!(
            config.limiter,
            LimiterConfig::LeakyBucket(LeakyBucketConfig {
                capacity: 5,
                leak_interval_ms: 100,
            })
        );
        assert_eq!(config.demo.bursts, 3);
        assert_eq!(config.demo.requests, 10);
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        let yaml = r#"
limiter:
  strategy: sliding_window
"#;
        let err = BucketgateConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, BucketgateError::Config(_)));
    }

    #[test]
    fn test_negative_rate_rejected() {
        let yaml = r#"
limiter:
  strategy: token_bucket
  refill_rate: -1
"#;
        assert!(BucketgateConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        let zero_capacity = r#"
limiter:
  strategy: leaky_bucket
  capacity: 0
"#;
        let err = BucketgateConfig::from_yaml(zero_capacity).unwrap_err();
        assert!(err.to_string().contains("capacity"));

        let zero_interval = r#"
limiter:
  strategy: token_bucket
  refill_interval_ms: 0
"#;
        let err = BucketgateConfig::from_yaml(zero_interval).unwrap_err();
        assert!(err.to_string().contains("refill_interval"));
    }

    #[test]
    fn test_oversized_demo_rejected() {
        let yaml = "demo:\n  requests: 4611686018427387904\n";
        let err = BucketgateConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("demo.requests"));

        let err = BucketgateConfig::from_yaml("demo:\n  bursts: 1001\n").unwrap_err();
        assert!(err.to_string().contains("demo.bursts"));
    }

    #[test]
    fn test_demo_limits_are_inclusive() {
        let demo = DemoConfig {
            requests: MAX_DEMO_REQUESTS,
            bursts: MAX_DEMO_BURSTS,
            ..DemoConfig::default()
        };
        assert!(demo.validate().is_ok());
        assert!(DemoConfig::default().validate().is_ok());
    }

    #[test]
    fn test_missing_file() {
        let err = BucketgateConfig::from_file("/nonexistent/bucketgate.yaml").unwrap_err();
        assert!(matches!(err, BucketgateError::Io(_)));
    }
}
