// src/config.rs
// =============================================================================
// Run parameters.
//
// A Config is built once from the command line, validated, and then only
// ever read. Nothing changes it while a run is going.
//
// Rust concepts:
// - Default trait: one place that spells out every default value
// - Duration: times are typed, no bare "milliseconds" integers past the CLI
// - thiserror: ConfigError messages come from the #[error] attributes
// - Arc<Config> (in the engine): many tasks read the same config for free
// =============================================================================

use std::path::PathBuf;
use std::time::Duration;

use crate::checker::RetryPolicy;
use crate::urls::is_valid;

pub const DEFAULT_BASE_URL: &str = "https://obelisk.ru/catalog/pamyatniki";

/// Every knob of a sitemap run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Catalog page the candidate URLs are built on
    pub base_url: String,
    /// Number of worker tasks pulling candidates off the queue
    pub workers: usize,
    /// Per-request timeout
    pub timeout: Duration,
    /// Capacity of the candidate queue, also the progress log interval
    pub batch_size: usize,
    /// Attempts per probe
    pub max_retries: u32,
    /// Admission gate: how many probes may hit the network at the same time
    pub gate_size: usize,
    /// Random pause before each probe is drawn from [min_delay, max_delay]
    pub min_delay: Duration,
    pub max_delay: Duration,
    /// Random pause a worker takes after each probe
    pub inter_request_min: Duration,
    pub inter_request_max: Duration,
    /// Backoff before the second attempt, doubled for each later one
    pub backoff_base: Duration,
    /// Random extra added to every backoff
    pub backoff_jitter: Duration,
    pub output_file: PathBuf,
    pub cache_file: PathBuf,
    pub cache_ttl: Duration,
    /// Probe every candidate even when the cache knows it
    pub ignore_cache: bool,
    pub proxy: Option<String>,
    /// Seed for the workers' random generators; None means OS entropy
    pub seed: Option<u64>,
}

// The defaults used when a flag is not given
impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            workers: 100,
            timeout: Duration::from_secs(2),
            batch_size: 200,
            max_retries: 3,
            gate_size: 10,
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(1500),
            inter_request_min: Duration::from_millis(200),
            inter_request_max: Duration::from_millis(500),
            backoff_base: Duration::from_millis(100),
            backoff_jitter: Duration::from_millis(200),
            output_file: PathBuf::from("sitemap_filters.xml"),
            cache_file: PathBuf::from("sitemap_cache.json"),
            cache_ttl: Duration::from_secs(24 * 60 * 60),
            ignore_cache: false,
            proxy: None,
            seed: None,
        }
    }
}

/// A configuration value that cannot work.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("base url '{0}' is not an absolute url")]
    InvalidBaseUrl(String),

    #[error("{0} must be greater than 0")]
    Zero(&'static str),

    #[error("min delay ({min:?}) is larger than max delay ({max:?})")]
    DelayRange { min: Duration, max: Duration },
}

impl Config {
    /// Checks the values that would otherwise hang or panic a run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_valid(&self.base_url) {
            return Err(ConfigError::InvalidBaseUrl(self.base_url.clone()));
        }

        // Zero workers or a zero-sized gate would hang the run forever,
        // a zero batch size would make the queue unusable
        let positive = [
            ("workers", self.workers),
            ("gate size", self.gate_size),
            ("batch size", self.batch_size),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Zero(*name));
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::Zero("timeout"));
        }

        // A random pause needs a non-empty range to draw from
        if self.min_delay > self.max_delay {
            return Err(ConfigError::DelayRange {
                min: self.min_delay,
                max: self.max_delay,
            });
        }
        if self.inter_request_min > self.inter_request_max {
            return Err(ConfigError::DelayRange {
                min: self.inter_request_min,
                max: self.inter_request_max,
            });
        }

        Ok(())
    }

    /// The retry settings handed to every probe.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff_base: self.backoff_base,
            max_jitter: self.backoff_jitter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert_eq!(Config::default().validate(), Ok(()));
    }

    #[test]
    fn test_rejects_relative_base_url() {
        let config = Config {
            base_url: "/catalog".to_string(),
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidBaseUrl(_))
        ));
    }

    #[test]
    fn test_rejects_zero_sizes() {
        let config = Config {
            gate_size: 0,
            ..Config::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::Zero("gate size")));

        let config = Config {
            workers: 0,
            ..Config::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::Zero("workers")));
    }

    #[test]
    fn test_rejects_inverted_delays() {
        let config = Config {
            min_delay: Duration::from_millis(900),
            max_delay: Duration::from_millis(100),
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DelayRange { .. })
        ));
    }

    #[test]
    fn test_retry_policy_follows_config() {
        let config = Config {
            max_retries: 5,
            ..Config::default()
        };
        let policy = config.retry_policy();
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.backoff_base, Duration::from_millis(100));
    }
}
