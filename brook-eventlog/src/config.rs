//! Brook configuration.
//!
//! Loads limits and lease timings from environment variables with sensible
//! defaults.

use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Hard upper bound on events accepted by a single append call.
pub const MAX_EVENTS_PER_APPEND_CEILING: usize = 100_000;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable could not be parsed
    #[error("Invalid {key} value: {value}")]
    InvalidValue {
        /// Variable name
        key: String,
        /// Raw value
        value: String,
    },

    /// Combination of settings is not usable
    #[error("Invalid brook configuration: {0}")]
    Invalid(String),
}

// =============================================================================
// Configuration
// =============================================================================

/// Transient-fault retry settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts including the first (1 = no retry)
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_backoff: Duration,
    /// Upper bound for any single delay
    pub max_backoff: Duration,
}

/// Brook writer, reader and recovery configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrookOptions {
    /// Maximum events written by one batch request
    pub max_events_per_batch: usize,
    /// Maximum estimated bytes written by one batch request
    pub max_request_bytes: usize,
    /// Events fetched per round trip when reading
    pub query_page_size: usize,
    /// Maximum events accepted by one append call
    pub max_events_per_append: usize,

    /// Lease taken on the brook's writer lock
    pub lease_duration: Duration,
    /// Renew the writer lock once this much time passed since the last renewal
    pub lease_renewal_threshold: Duration,
    /// How long append waits for a contended writer lock
    pub lock_acquire_timeout: Duration,
    /// Delay between attempts on a contended writer lock
    pub lock_acquire_poll_interval: Duration,

    /// Lease taken on the short-lived recovery lock
    pub recovery_lock_lease: Duration,
    /// Delay between cursor re-reads while another party recovers
    pub recovery_poll_interval: Duration,
    /// How long to wait for another party's recovery before giving up
    pub recovery_wait_timeout: Duration,

    /// Retry policy for single-batch writes and cursor commits
    pub retry: RetryConfig,
}

impl BrookOptions {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        let defaults = Self::default();
        let options = Self {
            max_events_per_batch: load_env("BROOK_MAX_EVENTS_PER_BATCH", defaults.max_events_per_batch)?,
            max_request_bytes: load_env("BROOK_MAX_REQUEST_BYTES", defaults.max_request_bytes)?,
            query_page_size: load_env("BROOK_QUERY_PAGE_SIZE", defaults.query_page_size)?,
            max_events_per_append: load_env("BROOK_MAX_EVENTS_PER_APPEND", defaults.max_events_per_append)?,
            lease_duration: load_millis("BROOK_LEASE_DURATION_MS", defaults.lease_duration)?,
            lease_renewal_threshold: load_millis(
                "BROOK_LEASE_RENEWAL_THRESHOLD_MS",
                defaults.lease_renewal_threshold,
            )?,
            lock_acquire_timeout: load_millis("BROOK_LOCK_ACQUIRE_TIMEOUT_MS", defaults.lock_acquire_timeout)?,
            lock_acquire_poll_interval: load_millis(
                "BROOK_LOCK_ACQUIRE_POLL_MS",
                defaults.lock_acquire_poll_interval,
            )?,
            recovery_lock_lease: load_millis("BROOK_RECOVERY_LOCK_LEASE_MS", defaults.recovery_lock_lease)?,
            recovery_poll_interval: load_millis("BROOK_RECOVERY_POLL_MS", defaults.recovery_poll_interval)?,
            recovery_wait_timeout: load_millis(
                "BROOK_RECOVERY_WAIT_TIMEOUT_MS",
                defaults.recovery_wait_timeout,
            )?,
            retry: RetryConfig {
                max_attempts: load_env("BROOK_RETRY_MAX_ATTEMPTS", defaults.retry.max_attempts)?,
                initial_backoff: load_millis(
                    "BROOK_RETRY_INITIAL_BACKOFF_MS",
                    defaults.retry.initial_backoff,
                )?,
                max_backoff: load_millis("BROOK_RETRY_MAX_BACKOFF_MS", defaults.retry.max_backoff)?,
            },
        };

        options.validate()?;
        Ok(options)
    }

    /// Create test configuration.
    ///
    /// Small limits and short timings so tests exercise batching and
    /// lease paths quickly.
    pub fn test() -> Self {
        Self {
            max_events_per_batch: 2,
            max_request_bytes: 64 * 1024,
            query_page_size: 2,
            max_events_per_append: 1_000,
            lease_duration: Duration::from_secs(5),
            lease_renewal_threshold: Duration::from_secs(2),
            lock_acquire_timeout: Duration::from_secs(1),
            lock_acquire_poll_interval: Duration::from_millis(10),
            recovery_lock_lease: Duration::from_secs(1),
            recovery_poll_interval: Duration::from_millis(10),
            recovery_wait_timeout: Duration::from_secs(1),
            retry: RetryConfig {
                max_attempts: 3,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(5),
            },
        }
    }

    /// Check limits and timings are usable together.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_events_per_batch == 0 {
            return Err(ConfigError::Invalid("max_events_per_batch must be > 0".to_string()));
        }
        if self.max_request_bytes == 0 {
            return Err(ConfigError::Invalid("max_request_bytes must be > 0".to_string()));
        }
        if self.query_page_size == 0 {
            return Err(ConfigError::Invalid("query_page_size must be > 0".to_string()));
        }
        if self.max_events_per_append == 0 || self.max_events_per_append > MAX_EVENTS_PER_APPEND_CEILING {
            return Err(ConfigError::Invalid(format!(
                "max_events_per_append must be in 1..={}, got {}",
                MAX_EVENTS_PER_APPEND_CEILING, self.max_events_per_append
            )));
        }
        if self.lease_renewal_threshold >= self.lease_duration {
            return Err(ConfigError::Invalid(format!(
                "lease_renewal_threshold ({:?}) must be shorter than lease_duration ({:?})",
                self.lease_renewal_threshold, self.lease_duration
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be >= 1".to_string()));
        }
        Ok(())
    }
}

impl Default for BrookOptions {
    fn default() -> Self {
        Self {
            max_events_per_batch: 90,
            max_request_bytes: 1_500_000,
            query_page_size: 100,
            max_events_per_append: 10_000,
            lease_duration: Duration::from_secs(60),
            lease_renewal_threshold: Duration::from_secs(20),
            lock_acquire_timeout: Duration::from_secs(30),
            lock_acquire_poll_interval: Duration::from_millis(100),
            recovery_lock_lease: Duration::from_secs(10),
            recovery_poll_interval: Duration::from_millis(200),
            recovery_wait_timeout: Duration::from_secs(10),
            retry: RetryConfig {
                max_attempts: 3,
                initial_backoff: Duration::from_millis(100),
                max_backoff: Duration::from_secs(2),
            },
        }
    }
}

fn load_env<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(val) => val.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: val,
        }),
        Err(_) => Ok(default),
    }
}

fn load_millis(key: &str, default: Duration) -> Result<Duration, ConfigError> {
    let millis = load_env(key, default.as_millis() as u64)?;
    Ok(Duration::from_millis(millis))
}

// =============================================================================
// Tests
// =============================================================================
