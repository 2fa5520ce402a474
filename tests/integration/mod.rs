//! Shared helpers for the integration tests.
//!
//! A wiremock server stands in for the intercepting proxy: requests sent
//! through it arrive in absolute form and are matched on the target's path.

pub mod proxy_discovery_test;
pub mod replay_pipeline_test;

use collection_replay::config::ReplayConfig;
use std::path::{Path, PathBuf};
use std::sync::Once;
use wiremock::MockServer;

static INIT: Once = Once::new();

/// Endpoint fetched through candidate proxies during verification.
pub const VERIFY_URL: &str = "http://verify.test/get";

/// Initialize test environment (run once)
pub fn init_test_env() {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// A local port with nothing listening on it.
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

/// `(host, port)` of a running mock server.
pub fn address_of(server: &MockServer) -> (String, u16) {
    let address = server.address();
    (address.ip().to_string(), address.port())
}

/// Configuration that verifies against [`VERIFY_URL`] and has no fallbacks.
pub fn test_config(proxy: (String, u16)) -> ReplayConfig {
    ReplayConfig {
        proxy_host: proxy.0,
        proxy_port: proxy.1,
        verify_url: VERIFY_URL.to_string(),
        verify_timeout_secs: 2,
        probe_timeout_ms: 500,
        fallback_proxies: Vec::new(),
        max_retries: 0,
        ..Default::default()
    }
}

/// Writes a JSON value to `dir/name` and returns the path.
pub fn write_json(dir: &Path, name: &str, value: &serde_json::Value) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, serde_json::to_string_pretty(value).unwrap()).unwrap();
    path
}
