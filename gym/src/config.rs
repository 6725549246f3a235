//! Configuration management for the reservation engine.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Values that fail to parse fall back to their default.

use gym_runtime::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::env;
use std::net::{AddrParseError, SocketAddr};
use std::time::Duration;

/// Engine configuration loaded from environment variables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Business policy constants
    pub policy: PolicyConfig,
    /// Lock and retry tuning
    pub concurrency: ConcurrencyConfig,
    /// Logging and metrics
    pub observability: ObservabilityConfig,
}

/// Business policy constants.
///
/// Only the numbers are configurable. Late cancellations are always rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Maximum PENDING/CONFIRMED reservations per user (default: 3)
    pub max_active_reservations: u32,
    /// Minimum notice for a cancellation, in minutes (default: 120)
    pub cancellation_window_minutes: u32,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_active_reservations: 3,
            cancellation_window_minutes: 120,
        }
    }
}

impl PolicyConfig {
    /// Cancellation window as a duration
    #[must_use]
    pub fn cancellation_window(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.cancellation_window_minutes))
    }
}

/// Lock and retry tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    /// Deadline for acquiring every lock an operation needs, in milliseconds (default: 2000)
    pub lock_timeout_ms: u64,
    /// Retries after a lock timeout before giving up (default: 3)
    pub max_retries: usize,
    /// Backoff before the first retry, in milliseconds (default: 25)
    pub retry_initial_delay_ms: u64,
    /// Backoff cap, in milliseconds (default: 500)
    pub retry_max_delay_ms: u64,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 2000,
            max_retries: 3,
            retry_initial_delay_ms: 25,
            retry_max_delay_ms: 500,
        }
    }
}

impl ConcurrencyConfig {
    /// Lock acquisition deadline
    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Retry policy for lock contention
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::builder()
            .max_retries(self.max_retries)
            .initial_delay(Duration::from_millis(self.retry_initial_delay_ms))
            .max_delay(Duration::from_millis(self.retry_max_delay_ms))
            .build()
    }
}

/// Logging and metrics settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Address the Prometheus exposition is served on
    pub metrics_addr: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_addr: "0.0.0.0:9090".to_string(),
        }
    }
}

impl ObservabilityConfig {
    /// Parsed metrics address.
    ///
    /// # Errors
    ///
    /// Returns [`AddrParseError`] if `metrics_addr` is not a socket address.
    pub fn metrics_socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        self.metrics_addr.parse()
    }
}

impl Config {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            policy: PolicyConfig {
                max_active_reservations: lookup("GYM_MAX_ACTIVE_RESERVATIONS")
                    .and_then(|s| s.trim().parse().ok())
                    .unwrap_or(defaults.policy.max_active_reservations),
                cancellation_window_minutes: lookup("GYM_CANCELLATION_WINDOW_MINUTES")
                    .and_then(|s| s.trim().parse().ok())
                    .unwrap_or(defaults.policy.cancellation_window_minutes),
            },
            concurrency: ConcurrencyConfig {
                lock_timeout_ms: lookup("GYM_LOCK_TIMEOUT_MS")
                    .and_then(|s| s.trim().parse().ok())
                    .unwrap_or(defaults.concurrency.lock_timeout_ms),
                max_retries: lookup("GYM_LOCK_MAX_RETRIES")
                    .and_then(|s| s.trim().parse().ok())
                    .unwrap_or(defaults.concurrency.max_retries),
                retry_initial_delay_ms: lookup("GYM_LOCK_RETRY_DELAY_MS")
                    .and_then(|s| s.trim().parse().ok())
                    .unwrap_or(defaults.concurrency.retry_initial_delay_ms),
                retry_max_delay_ms: lookup("GYM_LOCK_RETRY_MAX_DELAY_MS")
                    .and_then(|s| s.trim().parse().ok())
                    .unwrap_or(defaults.concurrency.retry_max_delay_ms),
            },
            observability: ObservabilityConfig {
                log_level: lookup("GYM_LOG_LEVEL").unwrap_or(defaults.observability.log_level),
                metrics_addr: lookup("GYM_METRICS_ADDR")
                    .unwrap_or(defaults.observability.metrics_addr),
            },
        }
    }
}
