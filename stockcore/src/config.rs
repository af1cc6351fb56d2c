//! Engine configuration.
//!
//! Every tunable is a validated newtype, so an `EngineConfig` that exists is
//! an `EngineConfig` that makes sense. Configuration can be deserialized with
//! serde or read from `STOCKCORE_*` environment variables.

use std::str::FromStr;
use std::time::Duration;

use nutype::nutype;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::notifier::QUANTITY_CHANGED_TOPIC;

/// How many times a request is attempted before a transient failure is
/// returned to the caller. One means no retry.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 10),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Into,
        Serialize,
        Deserialize
    )
)]
pub struct MaxRetryAttempts(u32);

/// Delay before the first retry, in milliseconds.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 10_000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Into,
        Serialize,
        Deserialize
    )
)]
pub struct RetryBaseDelayMs(u64);

impl RetryBaseDelayMs {
    pub fn as_duration(self) -> Duration {
        Duration::from_millis(self.into())
    }
}

/// Upper bound for any single retry delay, in milliseconds.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 300_000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Into,
        Serialize,
        Deserialize
    )
)]
pub struct RetryMaxDelayMs(u64);

impl RetryMaxDelayMs {
    pub fn as_duration(self) -> Duration {
        Duration::from_millis(self.into())
    }
}

/// Growth factor between consecutive retry delays.
#[nutype(
    validate(finite, greater_or_equal = 1.0, less_or_equal = 3.0),
    derive(Debug, Clone, Copy, PartialEq, PartialOrd, Into, Serialize, Deserialize)
)]
pub struct BackoffMultiplier(f64);

/// Retry schedule for transient transfer failures.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: MaxRetryAttempts,
    pub base_delay_ms: RetryBaseDelayMs,
    pub max_delay_ms: RetryMaxDelayMs,
    pub backoff_multiplier: BackoffMultiplier,
}

impl RetryConfig {
    /// A schedule that gives up after the first attempt.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: MaxRetryAttempts::try_new(1).expect("1 is a valid attempt count"),
            ..Self::default()
        }
    }

    /// Delay before attempt `attempt + 1`, before jitter.
    ///
    /// `attempt` counts from zero for the first try.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let max = self.max_delay_ms.as_duration();
        let factor = f64::from(self.backoff_multiplier)
            .powi(i32::try_from(attempt).unwrap_or(i32::MAX))
            .min(1e6);
        self.base_delay_ms.as_duration().mul_f64(factor).min(max)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: MaxRetryAttempts::try_new(3).expect("3 is a valid attempt count"),
            base_delay_ms: RetryBaseDelayMs::try_new(20).expect("20ms is a valid base delay"),
            max_delay_ms: RetryMaxDelayMs::try_new(1_000).expect("1s is a valid max delay"),
            backoff_multiplier: BackoffMultiplier::try_new(2.0)
                .expect("2.0 is a valid multiplier"),
        }
    }
}

/// Where move-out takes its candidate ordering from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingMode {
    /// Order candidates by distance computed from their zip codes.
    #[default]
    Computed,
    /// Order candidates by the ranking cache. A cache failure degrades to
    /// the unranked candidate list.
    Cached,
}

impl FromStr for RankingMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "computed" => Ok(Self::Computed),
            "cached" => Ok(Self::Cached),
            other => Err(ConfigError::Invalid {
                key: ENV_RANKING_MODE,
                detail: format!("unknown ranking mode {other:?}"),
            }),
        }
    }
}

/// Transfer engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub retry: RetryConfig,
    pub ranking: RankingMode,
    pub notification_topic: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            ranking: RankingMode::default(),
            notification_topic: QUANTITY_CHANGED_TOPIC.to_string(),
        }
    }
}

/// Error raised while loading configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {detail}")]
    Invalid { key: &'static str, detail: String },
}

const ENV_MAX_RETRY_ATTEMPTS: &str = "STOCKCORE_MAX_RETRY_ATTEMPTS";
const ENV_RETRY_BASE_DELAY_MS: &str = "STOCKCORE_RETRY_BASE_DELAY_MS";
const ENV_RETRY_MAX_DELAY_MS: &str = "STOCKCORE_RETRY_MAX_DELAY_MS";
const ENV_BACKOFF_MULTIPLIER: &str = "STOCKCORE_BACKOFF_MULTIPLIER";
const ENV_RANKING_MODE: &str = "STOCKCORE_RANKING_MODE";
const ENV_NOTIFICATION_TOPIC: &str = "STOCKCORE_NOTIFICATION_TOPIC";

impl EngineConfig {
    /// Reads `STOCKCORE_*` variables, falling back to defaults for unset ones.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`EngineConfig::from_env`] with an explicit variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_MAX_RETRY_ATTEMPTS) {
            config.retry.max_attempts =
                MaxRetryAttempts::try_new(parse(ENV_MAX_RETRY_ATTEMPTS, &raw)?)
                    .map_err(|e| invalid(ENV_MAX_RETRY_ATTEMPTS, e))?;
        }
        if let Some(raw) = lookup(ENV_RETRY_BASE_DELAY_MS) {
            config.retry.base_delay_ms =
                RetryBaseDelayMs::try_new(parse(ENV_RETRY_BASE_DELAY_MS, &raw)?)
                    .map_err(|e| invalid(ENV_RETRY_BASE_DELAY_MS, e))?;
        }
        if let Some(raw) = lookup(ENV_RETRY_MAX_DELAY_MS) {
            config.retry.max_delay_ms =
                RetryMaxDelayMs::try_new(parse(ENV_RETRY_MAX_DELAY_MS, &raw)?)
                    .map_err(|e| invalid(ENV_RETRY_MAX_DELAY_MS, e))?;
        }
        if let Some(raw) = lookup(ENV_BACKOFF_MULTIPLIER) {
            config.retry.backoff_multiplier =
                BackoffMultiplier::try_new(parse(ENV_BACKOFF_MULTIPLIER, &raw)?)
                    .map_err(|e| invalid(ENV_BACKOFF_MULTIPLIER, e))?;
        }
        if let Some(raw) = lookup(ENV_RANKING_MODE) {
            config.ranking = raw.parse()?;
        }
        if let Some(raw) = lookup(ENV_NOTIFICATION_TOPIC) {
            let topic = raw.trim();
            if topic.is_empty() {
                return Err(ConfigError::Invalid {
                    key: ENV_NOTIFICATION_TOPIC,
                    detail: "topic must not be empty".to_string(),
                });
            }
            config.notification_topic = topic.to_string();
        }

        Ok(config)
    }
}

fn parse<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e| invalid(key, e))
}

fn invalid(key: &'static str, error: impl std::fmt::Display) -> ConfigError {
    ConfigError::Invalid {
        key,
        detail: error.to_string(),
    }
}
