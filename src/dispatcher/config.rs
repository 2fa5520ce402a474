//! Dispatch configuration.
//!
//! Transport settings shape the HTTP client; the retry policy decides how
//! many times a transport fault is retried and how long to wait in between.

use crate::config::ReplayConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for the HTTP client requests are sent with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Per-attempt timeout in seconds.
    pub timeout_secs: u64,

    pub follow_redirects: bool,

    pub max_redirects: u32,

    /// Validate TLS certificates. Off by default since the proxy re-signs
    /// traffic with its own CA.
    pub verify_ssl: bool,
}

impl TransportConfig {
    /// Returns the timeout as a `std::time::Duration`.
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn from_config(config: &ReplayConfig) -> Self {
        Self {
            timeout_secs: config.timeout_secs,
            follow_redirects: config.follow_redirects,
            max_redirects: config.max_redirects,
            verify_ssl: config.verify_ssl,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::from_config(&ReplayConfig::default())
    }
}

/// Retry policy for transport faults.
///
/// The first attempt is followed by up to `max_retries` retries; before retry
/// `n` (1-based) the dispatcher waits `backoff_base_secs * 2^(n-1)` seconds,
/// so the default policy waits 2, 4 and 8 seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base_secs: u64,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_base_secs: u64) -> Self {
        Self {
            max_retries,
            backoff_base_secs,
        }
    }

    /// Never retries.
    pub fn none() -> Self {
        Self::new(0, 0)
    }

    pub fn from_config(config: &ReplayConfig) -> Self {
        Self::new(config.max_retries, config.backoff_base_secs)
    }

    /// Upper bound on attempts for one request.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before the given retry (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        Duration::from_secs(self.backoff_base_secs.saturating_mul(1 << exponent))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, 2)
    }
}
