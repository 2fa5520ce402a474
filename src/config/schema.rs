//! Configuration schema for a replay run.
//!
//! This module defines the configuration structure and validation logic for
//! every setting that shapes discovery, materialization and dispatch.

use crate::variables::UnresolvedPolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Upper bound on `maxRetries`.
pub const MAX_RETRIES_LIMIT: u32 = 10;

/// Main configuration structure for a replay run.
///
/// Read from a camelCase JSON document. Missing settings fall back to
/// defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayConfig {
    /// Host of the explicit proxy candidate. Defaults to `localhost`.
    #[serde(default = "default_proxy_host")]
    pub proxy_host: String,

    /// Port of the explicit proxy candidate. Defaults to 8080.
    ///
    /// Must be greater than 0.
    #[serde(default = "default_proxy_port")]
    pub proxy_port: u16,

    /// Whether to validate TLS certificates of the target.
    ///
    /// Defaults to false: the intercepting proxy re-signs traffic with its
    /// own CA, which the client does not trust.
    #[serde(default)]
    pub verify_ssl: bool,

    /// Use the explicit proxy without probing or verifying it.
    #[serde(default)]
    pub skip_proxy_check: bool,

    /// Per-attempt request timeout in seconds. Defaults to 30.
    ///
    /// Must be greater than 0.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Whether to automatically follow HTTP redirects. Defaults to true.
    #[serde(default = "default_follow_redirects")]
    pub follow_redirects: bool,

    /// Maximum number of redirects to follow. Defaults to 10.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: u32,

    /// Retries after a transport fault. Defaults to 3.
    ///
    /// Must not exceed [`MAX_RETRIES_LIMIT`].
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base of the exponential backoff in seconds. Defaults to 2.
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,

    /// TCP probe timeout in milliseconds. Defaults to 2000.
    ///
    /// Must be greater than 0.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Endpoint fetched through a candidate proxy to verify it.
    #[serde(default = "default_verify_url")]
    pub verify_url: String,

    /// Timeout of the verification request in seconds. Defaults to 5.
    #[serde(default = "default_verify_timeout_secs")]
    pub verify_timeout_secs: u64,

    /// Variable holding the target base URL. Never encoded.
    #[serde(default = "default_anchor_variable")]
    pub anchor_variable: String,

    /// Variables kept literally, without a warning, when unresolved.
    #[serde(default = "default_passthrough_variables")]
    pub passthrough_variables: Vec<String>,

    /// Header carrying the generated request id.
    #[serde(default = "default_correlation_header")]
    pub correlation_header: String,

    /// What to substitute for unresolved, non-whitelisted variables.
    #[serde(default)]
    pub unresolved_policy: UnresolvedPolicy,

    /// Proxies scanned when the explicit one fails, in order.
    #[serde(default = "default_fallback_proxies")]
    pub fallback_proxies: Vec<ProxyAddress>,

    /// Headers added to every request that does not declare them.
    #[serde(default)]
    pub default_headers: BTreeMap<String, String>,
}

/// A `host:port` pair in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyAddress {
    pub host: String,
    pub port: u16,
}

impl ProxyAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            proxy_host: default_proxy_host(),
            proxy_port: default_proxy_port(),
            verify_ssl: false,
            skip_proxy_check: false,
            timeout_secs: default_timeout_secs(),
            follow_redirects: default_follow_redirects(),
            max_redirects: default_max_redirects(),
            max_retries: default_max_retries(),
            backoff_base_secs: default_backoff_base_secs(),
            probe_timeout_ms: default_probe_timeout_ms(),
            verify_url: default_verify_url(),
            verify_timeout_secs: default_verify_timeout_secs(),
            anchor_variable: default_anchor_variable(),
            passthrough_variables: default_passthrough_variables(),
            correlation_header: default_correlation_header(),
            unresolved_policy: UnresolvedPolicy::default(),
            fallback_proxies: default_fallback_proxies(),
            default_headers: BTreeMap::new(),
        }
    }
}

impl ReplayConfig {
    /// Validates the configuration and returns errors if any settings are invalid.
    ///
    /// # Returns
    ///
    /// `Ok(())` if all settings are valid, or `Err` with a descriptive error message.
    pub fn validate(&self) -> Result<(), String> {
        if self.timeout_secs == 0 {
            return Err("timeoutSecs must be greater than 0".to_string());
        }

        if self.proxy_port == 0 {
            return Err("proxyPort must be greater than 0".to_string());
        }

        if self.proxy_host.trim().is_empty() {
            return Err("proxyHost must not be empty".to_string());
        }

        if self.probe_timeout_ms == 0 {
            return Err("probeTimeoutMs must be greater than 0".to_string());
        }

        if self.verify_timeout_secs == 0 {
            return Err("verifyTimeoutSecs must be greater than 0".to_string());
        }

        if url::Url::parse(&self.verify_url).is_err() {
            return Err(format!("verifyUrl is not a valid URL: {}", self.verify_url));
        }

        if self.anchor_variable.trim().is_empty() {
            return Err("anchorVariable must not be empty".to_string());
        }

        if self.correlation_header.trim().is_empty() {
            return Err("correlationHeader must not be empty".to_string());
        }

        if let Some(bad) = self.fallback_proxies.iter().find(|p| p.port == 0) {
            return Err(format!("fallbackProxies entry {} has port 0", bad.host));
        }

        if self.max_retries > MAX_RETRIES_LIMIT {
            return Err(format!(
                "maxRetries must be at most {}",
                MAX_RETRIES_LIMIT
            ));
        }

        // max_redirects and max_retries can be 0

        Ok(())
    }

    /// Returns the probe timeout as a `std::time::Duration`.
    pub fn probe_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.probe_timeout_ms)
    }

    /// Returns the verification timeout as a `std::time::Duration`.
    pub fn verify_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.verify_timeout_secs)
    }

    /// The fallback list as `(host, port)` pairs.
    pub fn fallback_list(&self) -> Vec<(String, u16)> {
        self.fallback_proxies
            .iter()
            .map(|p| (p.host.clone(), p.port))
            .collect()
    }

    /// Merges this configuration with another, using values from `other` where present.
    ///
    /// # Arguments
    ///
    /// * `other` - Configuration to merge with (takes precedence)
    ///
    /// # Returns
    ///
    /// A new `ReplayConfig` with merged values. Default headers are combined,
    /// with `other` winning on conflicts.
    pub fn merge(&self, other: &ReplayConfig) -> Self {
        let mut default_headers = self.default_headers.clone();
        default_headers.extend(other.default_headers.clone());

        Self {
            default_headers,
            ..other.clone()
        }
    }
}

// Default value functions for serde

fn default_proxy_host() -> String {
    "localhost".to_string()
}

fn default_proxy_port() -> u16 {
    8080
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_follow_redirects() -> bool {
    true
}

fn default_max_redirects() -> u32 {
    10
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base_secs() -> u64 {
    2
}

fn default_probe_timeout_ms() -> u64 {
    2000
}

fn default_verify_url() -> String {
    "https://httpbin.org/get".to_string()
}

fn default_verify_timeout_secs() -> u64 {
    5
}

fn default_anchor_variable() -> String {
    "base_url".to_string()
}

fn default_passthrough_variables() -> Vec<String> {
    vec!["base_url".to_string(), "host".to_string()]
}

fn default_correlation_header() -> String {
    "X-Replay-Request-Id".to_string()
}

fn default_fallback_proxies() -> Vec<ProxyAddress> {
    crate::proxy::common_proxies()
        .into_iter()
        .map(|(host, port)| ProxyAddress::new(host, port))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ReplayConfig::default();
        assert_eq!(config.proxy_host, "localhost");
        assert_eq!(config.proxy_port, 8080);
        assert!(!config.verify_ssl);
        assert!(!config.skip_proxy_check);
        assert_eq!(config.timeout_secs, 30);
        assert!(config.follow_redirects);
        assert_eq!(config.max_redirects, 10);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.backoff_base_secs, 2);
        assert_eq!(config.verify_url, "https://httpbin.org/get");
        assert_eq!(config.anchor_variable, "base_url");
        assert_eq!(config.passthrough_variables, vec!["base_url", "host"]);
        assert_eq!(config.unresolved_policy, UnresolvedPolicy::KeepLiteral);
        assert_eq!(config.fallback_proxies.len(), 8);
        assert_eq!(config.fallback_proxies[1], ProxyAddress::new("localhost", 8090));
        assert!(config.default_headers.is_empty());
    }

    #[test]
    fn test_config_validation_valid() {
        assert!(ReplayConfig::default().validate().is_ok());
    }

    #[test]
    fn test_config_validation_zero_timeout() {
        let config = ReplayConfig {
            timeout_secs: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate().unwrap_err(),
            "timeoutSecs must be greater than 0"
        );
    }

    #[test]
    fn test_config_validation_bad_verify_url() {
        let config = ReplayConfig {
            verify_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().starts_with("verifyUrl"));
    }

    #[test]
    fn test_config_validation_zero_retries_allowed() {
        let config = ReplayConfig {
            max_retries: 0,
            max_redirects: 0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_retries_bounded() {
        let config: ReplayConfig =
            serde_json::from_value(serde_json::json!({"maxRetries": u32::MAX})).unwrap();
        assert_eq!(
            config.validate().unwrap_err(),
            "maxRetries must be at most 10"
        );

        let at_limit = ReplayConfig {
            max_retries: MAX_RETRIES_LIMIT,
            ..Default::default()
        };
        assert!(at_limit.validate().is_ok());
    }

    #[test]
    fn test_deserialization_with_defaults() {
        let json = r#"{
            "proxyPort": 8090,
            "unresolvedPolicy": "empty",
            "fallbackProxies": [{"host": "10.0.0.5", "port": 3128}]
        }"#;

        let config: ReplayConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.proxy_port, 8090);
        assert_eq!(config.unresolved_policy, UnresolvedPolicy::Empty);
        assert_eq!(config.fallback_list(), vec![("10.0.0.5".to_string(), 3128)]);
        // Other fields should have defaults
        assert_eq!(config.proxy_host, "localhost");
        assert_eq!(config.timeout_secs, 30);
    }

    #[test]
    fn test_merge_config() {
        let mut base = ReplayConfig::default();
        base.default_headers
            .insert("User-Agent".to_string(), "replay".to_string());
        base.default_headers
            .insert("Accept".to_string(), "*/*".to_string());

        let mut custom = ReplayConfig {
            timeout_secs: 60,
            ..Default::default()
        };
        custom
            .default_headers
            .insert("Accept".to_string(), "application/json".to_string());

        let merged = base.merge(&custom);
        assert_eq!(merged.timeout_secs, 60);
        assert_eq!(merged.default_headers.len(), 2);
        assert_eq!(merged.default_headers["Accept"], "application/json");
        assert!(merged.follow_redirects); // Unchanged
    }

    #[test]
    fn test_serialization() {
        let json = serde_json::to_string(&ReplayConfig::default()).unwrap();
        assert!(json.contains("proxyPort"));
        assert!(json.contains("keepLiteral"));
        assert!(json.contains("verifySsl"));
    }
}
